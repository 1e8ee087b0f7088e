//! Server configuration.

use serde::{Deserialize, Serialize};
use vigil_settings::ServerSettings;

/// Bind address and transport tuning for the server.
///
/// Defaults favor tests and local development: loopback only, with port 0
/// letting the OS assign a free port. Deployments build this from
/// [`ServerSettings`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on. 0 means auto-assign.
    pub port: u16,
    /// Seconds between server-initiated pings on each connection.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a connection is considered dead.
    pub heartbeat_timeout_secs: u64,
    /// Maximum accepted WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 45,
            max_message_size: 64 * 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.heartbeat_timeout_secs,
            max_message_size: settings.max_message_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_loopback_with_auto_port() {
        let config = ServerConfig::default();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 0);
        assert_eq!(config.heartbeat_interval_secs, 15);
        assert_eq!(config.heartbeat_timeout_secs, 45);
        assert_eq!(config.max_message_size, 65_536);
    }

    #[test]
    fn config_follows_settings() {
        let settings = ServerSettings::default();
        let config = ServerConfig::from(&settings);

        assert_eq!(config.host, settings.host);
        assert_eq!(config.port, settings.port);
        assert_eq!(config.heartbeat_interval_secs, settings.heartbeat_interval_secs);
        assert_eq!(config.max_message_size, settings.max_message_size);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            heartbeat_interval_secs: 10,
            heartbeat_timeout_secs: 30,
            max_message_size: 1024,
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.host, "0.0.0.0");
        assert_eq!(parsed.port, 8080);
        assert_eq!(parsed.heartbeat_timeout_secs, 30);
    }
}
