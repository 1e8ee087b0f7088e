//! Layered settings for the vigil server.
//!
//! Settings resolve in three layers, later layers winning: compiled
//! defaults, the JSON file at `~/.vigil/settings.json`, then `VIGIL_*`
//! environment variables. The resolved value is cached in a process-wide
//! singleton.

#![deny(unsafe_code)]

mod errors;
mod loader;
mod types;

use std::sync::OnceLock;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path, vigil_dir};
pub use types::{
    AuthSettings, DatabaseSettings, LogLevel, LoggingSettings, ServerSettings, VigilSettings,
};

static SETTINGS: OnceLock<VigilSettings> = OnceLock::new();

/// Global settings, loaded on first access.
///
/// Falls back to compiled defaults if the settings file cannot be read.
pub fn get_settings() -> &'static VigilSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to load settings, using defaults");
            VigilSettings::default()
        })
    })
}

/// Install explicit settings before anything calls [`get_settings`].
///
/// # Errors
///
/// Returns the rejected value if the singleton was already initialized.
pub fn init_settings(settings: VigilSettings) -> std::result::Result<(), VigilSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serialize_round_trip() {
        let settings = VigilSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: VigilSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, settings.server.port);
        assert_eq!(back.auth.token_leeway_secs, settings.auth.token_leeway_secs);
    }

    #[test]
    fn get_settings_returns_stable_reference() {
        let first = get_settings();
        let second = get_settings();
        assert!(std::ptr::eq(first, second));
        assert!(!first.name.is_empty());
        assert!(first.server.port > 0);
    }
}
