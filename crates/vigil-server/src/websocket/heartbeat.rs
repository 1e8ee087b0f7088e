//! Connection liveness watching.
//!
//! The outbound writer pings on an interval; any client traffic marks the
//! connection alive. This watcher consumes the liveness flag on the same
//! interval and gives up after enough consecutive silent ticks to cover
//! the configured timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::debug;

use super::connection::SessionConnection;

/// Why the heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client went silent past the timeout.
    TimedOut,
    /// The connection was closed by someone else first.
    Cancelled,
}

/// Watch a connection until it times out or closes.
pub async fn run_heartbeat(
    connection: Arc<SessionConnection>,
    interval: Duration,
    timeout: Duration,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    let interval_secs = interval.as_secs().max(1);
    #[allow(clippy::cast_possible_truncation)]
    let max_missed = (timeout.as_secs() / interval_secs).max(1) as u32;
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    debug!(
                        connection_id = %connection.id,
                        missed,
                        max_missed,
                        "no traffic since last check"
                    );
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = connection.closed() => return HeartbeatResult::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use vigil_core::ids::{SessionId, UserId};
    use vigil_core::session::Role;

    fn connection() -> Arc<SessionConnection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(SessionConnection::new(
            SessionId::from_string("sess_1"),
            UserId::from_string("user_s1"),
            Role::Student,
            tx,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_times_out() {
        let conn = connection();
        // Consume the initial alive flag so every tick counts as missed.
        let _ = conn.check_alive();

        let result = run_heartbeat(
            conn,
            Duration::from_secs(10),
            Duration::from_secs(30),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_resets_the_missed_counter() {
        let conn = connection();
        let watcher = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ));

        // Stay chatty well past the timeout, then go silent.
        for _ in 0..6 {
            conn.mark_alive();
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        assert!(!watcher.is_finished());

        let result = watcher.await.unwrap();
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_the_watcher() {
        let conn = connection();
        let watcher = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ));

        conn.close();
        let result = watcher.await.unwrap();

        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_intervals_still_time_out() {
        let conn = connection();
        let _ = conn.check_alive();

        let result = run_heartbeat(
            conn,
            Duration::from_millis(10),
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
    }
}
