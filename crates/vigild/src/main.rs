//! # vigild
//!
//! Live test-session server binary — wires settings, storage, flows, and
//! the HTTP/WebSocket server together.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use vigil_runtime::{AttemptFlows, EventBus, LockMap, NoopScoring, SessionFlows, StateSync};
use vigil_server::{JwtVerifier, ServerConfig, VigilServer};
use vigil_settings::DatabaseSettings;
use vigil_store::{ConnectionConfig, SessionStore};

/// Live test-session server.
#[derive(Parser, Debug)]
#[command(name = "vigild", about = "Live test-session server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,
}

/// Resolve the database path: the CLI flag wins, then the settings value,
/// with relative settings paths anchored under `~/.vigil`.
fn resolve_db_path(cli_db_path: Option<PathBuf>, database: &DatabaseSettings) -> PathBuf {
    if let Some(path) = cli_db_path {
        return path;
    }
    let configured = PathBuf::from(&database.path);
    if configured.is_absolute() {
        configured
    } else {
        vigil_settings::vigil_dir().join(configured)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings first: they decide the database location and log level.
    let settings = vigil_settings::get_settings();

    // Database before logging so tracing events are persisted from the start.
    let db_path = resolve_db_path(args.db_path, &settings.database);
    ensure_parent_dir(&db_path)?;
    let store = Arc::new(
        SessionStore::new_file(
            &db_path.to_string_lossy(),
            &ConnectionConfig {
                pool_size: settings.database.pool_size,
                busy_timeout_ms: settings.database.busy_timeout_ms,
                cache_size_kib: settings.database.cache_size_kib,
            },
        )
        .context("Failed to open database")?,
    );

    // Logging with SQLite persistence (dedicated connection, separate from
    // the pool). Must set WAL + busy_timeout to match pool connections —
    // without busy_timeout, concurrent writes from the pool cause immediate
    // SQLITE_BUSY errors.
    let log_conn =
        rusqlite::Connection::open(&db_path).context("Failed to open logging DB connection")?;
    log_conn
        .execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        .context("Failed to set logging connection pragmas")?;
    let log_handle = vigil_logging::init_subscriber_with_sqlite(
        settings.logging.db_log_level.as_filter_str(),
        log_conn,
    );
    let flush_task = vigil_logging::spawn_flush_task(log_handle.clone());

    // Core services.
    let bus = Arc::new(EventBus::default());
    let sessions = Arc::new(SessionFlows::new(
        store.clone(),
        Arc::new(LockMap::new()),
        bus.clone(),
    ));
    let attempts = Arc::new(AttemptFlows::new(
        store.clone(),
        Arc::new(LockMap::new()),
        bus.clone(),
        Arc::new(NoopScoring),
    ));
    let sync = Arc::new(StateSync::new(store));
    let verifier = Arc::new(JwtVerifier::new(
        &settings.auth.token_secret,
        settings.auth.token_leeway_secs,
    ));

    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Build and start the server, then the bus-to-socket bridge.
    let server = VigilServer::new(config, sessions, attempts, sync, verifier);
    let bridge_handle = server.spawn_event_bridge(bus.subscribe());
    let (addr, server_handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(db = %db_path.display(), "vigild listening on http://{addr}");

    // Wait for shutdown signal.
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    // Close live sockets first so the listener's graceful shutdown does not
    // wait out the heartbeat timeout on idle connections.
    server.registry().drain();
    server
        .shutdown()
        .graceful_shutdown(vec![server_handle], None)
        .await;
    bridge_handle.abort();

    // Flush remaining logs to SQLite and stop the periodic flush task.
    flush_task.abort();
    log_handle.flush();

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_to_settings() {
        let cli = Cli::parse_from(["vigild"]);
        assert_eq!(cli.host, None);
        assert_eq!(cli.port, None);
        assert_eq!(cli.db_path, None);
    }

    #[test]
    fn cli_custom_host_and_port() {
        let cli = Cli::parse_from(["vigild", "--host", "0.0.0.0", "--port", "9090"]);
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.port, Some(9090));
    }

    #[test]
    fn cli_db_path() {
        let cli = Cli::parse_from(["vigild", "--db-path", "/tmp/test.db"]);
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/test.db")));
    }

    #[test]
    fn resolve_db_path_prefers_cli() {
        let database = DatabaseSettings::default();
        let path = resolve_db_path(Some(PathBuf::from("/tmp/cli.db")), &database);
        assert_eq!(path, PathBuf::from("/tmp/cli.db"));
    }

    #[test]
    fn resolve_db_path_keeps_absolute_settings_path() {
        let database = DatabaseSettings {
            path: "/var/lib/vigil/vigil.db".to_string(),
            ..DatabaseSettings::default()
        };
        let path = resolve_db_path(None, &database);
        assert_eq!(path, PathBuf::from("/var/lib/vigil/vigil.db"));
    }

    #[test]
    fn resolve_db_path_anchors_relative_settings_path() {
        let database = DatabaseSettings::default();
        let path = resolve_db_path(None, &database);
        assert!(path.to_string_lossy().contains(".vigil"));
        assert!(path.ends_with("vigil.db"));
    }

    #[test]
    fn ensure_parent_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("test.db");
        ensure_parent_dir(&path).unwrap();
        assert!(path.parent().unwrap().exists());
    }

    fn boot_server(store: Arc<SessionStore>) -> (VigilServer, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let sessions = Arc::new(SessionFlows::new(
            store.clone(),
            Arc::new(LockMap::new()),
            bus.clone(),
        ));
        let attempts = Arc::new(AttemptFlows::new(
            store.clone(),
            Arc::new(LockMap::new()),
            bus.clone(),
            Arc::new(NoopScoring),
        ));
        let sync = Arc::new(StateSync::new(store));
        let server = VigilServer::new(
            ServerConfig::default(),
            sessions,
            attempts,
            sync,
            Arc::new(JwtVerifier::new("test-secret", 30)),
        );
        (server, bus)
    }

    #[test]
    fn server_creates_db_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("new.db");
        assert!(!db_path.exists());

        let _store = SessionStore::new_file(
            &db_path.to_string_lossy(),
            &ConnectionConfig::default(),
        )
        .unwrap();

        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn server_boots_and_responds() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("vigil.db");
        let store = Arc::new(
            SessionStore::new_file(&db_path.to_string_lossy(), &ConnectionConfig::default())
                .unwrap(),
        );

        let (server, bus) = boot_server(store);
        let _bridge = server.spawn_event_bridge(bus.subscribe());
        let (addr, handle) = server.listen().await.unwrap();

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert!(resp.status().is_success());
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        server.shutdown().shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn server_graceful_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("vigil.db");
        let store = Arc::new(
            SessionStore::new_file(&db_path.to_string_lossy(), &ConnectionConfig::default())
                .unwrap(),
        );

        let (server, _bus) = boot_server(store);
        let (_, handle) = server.listen().await.unwrap();

        server.registry().drain();
        server
            .shutdown()
            .graceful_shutdown(vec![handle], Some(std::time::Duration::from_secs(5)))
            .await;
        assert!(server.shutdown().is_shutting_down());
    }
}
