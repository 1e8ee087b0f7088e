//! # vigil-logging
//!
//! Structured logging with `tracing` and optional `SQLite` transport.
//!
//! Provides session/attempt/user ID propagation via span fields and
//! batched writes to the `logs` table.

#![deny(unsafe_code)]

mod transport;
mod types;

use std::time::Duration;

use rusqlite::Connection;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use transport::{SqliteTransport, TransportConfig, TransportHandle};
pub use types::LogLevel;

/// Initialize a plain stderr subscriber.
///
/// `default_filter` is used when `RUST_LOG` is not set. Safe to call more
/// than once; later calls are no-ops.
pub fn init_subscriber(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Initialize the subscriber with both stderr output and `SQLite` persistence.
///
/// `db_log_level` sets the default filter (overridable via `RUST_LOG`) and
/// the minimum level persisted to the database. The connection must point at
/// a database that already has the `logs` table. Returns a handle for manual
/// flushing at shutdown.
pub fn init_subscriber_with_sqlite(db_log_level: &str, conn: Connection) -> TransportHandle {
    let transport = SqliteTransport::new(
        conn,
        TransportConfig {
            min_level: LogLevel::from_str_lossy(db_log_level).as_num(),
            ..TransportConfig::default()
        },
    );
    let handle = transport.handle();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(db_log_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(transport)
        .try_init();

    handle
}

/// Spawn a background task that flushes the transport once per second.
///
/// Abort the returned handle at shutdown, then call [`TransportHandle::flush`]
/// one final time.
pub fn spawn_flush_task(handle: TransportHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(
            TransportConfig::default().flush_interval_ms,
        ));
        loop {
            let _ = interval.tick().await;
            handle.flush();
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
