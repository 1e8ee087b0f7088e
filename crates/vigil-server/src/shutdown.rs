//! Coordinated graceful shutdown.
//!
//! A single [`CancellationToken`] fans out to everything that needs to
//! stop: the accept loop, per-connection tasks, and background workers.
//! [`ShutdownCoordinator::graceful_shutdown`] then waits for the spawned
//! tasks to drain, bounded by a timeout so a wedged task cannot hold the
//! process open forever.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token observed by tasks that should stop on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal all observers to begin shutting down.
    pub fn shutdown(&self) {
        info!("shutdown signalled");
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait for `handles` to finish.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        self.shutdown();
        let deadline = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        info!(task_count = handles.len(), "waiting for tasks to drain");
        let drained = tokio::time::timeout(deadline, futures::future::join_all(handles)).await;
        match drained {
            Ok(_) => info!("shutdown complete"),
            Err(_) => warn!(timeout_secs = deadline.as_secs(), "shutdown timed out; abandoning tasks"),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
