//! Per-socket connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vigil_core::ids::{SessionId, UserId};
use vigil_core::session::Role;
use vigil_wire::ServerEvent;

/// One live WebSocket, owned by the session task that services it.
///
/// The handle is shared with the registry and the heartbeat watcher.
/// Sending never blocks: outbound events are queued on a bounded channel
/// and dropped (with a counter bump) if the client cannot keep up.
/// `close` cancels the connection's token, which every task servicing the
/// socket watches; teardown always funnels through the session task's
/// cleanup path.
pub struct SessionConnection {
    /// Unique id for this socket, distinct from the user id so a
    /// superseded connection can be told apart from its replacement.
    pub id: String,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: Role,
    tx: mpsc::Sender<Arc<String>>,
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
    cancel: CancellationToken,
}

impl SessionConnection {
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        role: Role,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Self {
        Self {
            id: format!("conn_{}", Uuid::now_v7().simple()),
            session_id,
            user_id,
            role,
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
            dropped_messages: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a pre-serialized event. Returns false if the queue is full
    /// or the socket is gone.
    pub fn send(&self, text: Arc<String>) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Serialize and queue an event.
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Record liveness from any client traffic.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Consume the liveness flag. Returns whether the client was heard
    /// from since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Ask every task servicing this socket to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

impl std::fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConnection")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(capacity: usize) -> (SessionConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = SessionConnection::new(
            SessionId::from_string("sess_1"),
            UserId::from_string("user_s1"),
            Role::Student,
            tx,
        );
        (conn, rx)
    }

    #[tokio::test]
    async fn send_queues_text_for_the_writer() {
        let (conn, mut rx) = connection(4);

        assert!(conn.send(Arc::new("hello".to_string())));
        assert_eq!(rx.recv().await.unwrap().as_str(), "hello");
    }

    #[tokio::test]
    async fn send_event_serializes_to_wire_json() {
        let (conn, mut rx) = connection(4);

        assert!(conn.send_event(&ServerEvent::Pong {}));

        let text = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "pong");
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let (conn, _rx) = connection(1);

        assert!(conn.send(Arc::new("first".to_string())));
        assert!(!conn.send(Arc::new("second".to_string())));
        assert!(!conn.send(Arc::new("third".to_string())));
        assert_eq!(conn.drop_count(), 2);
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (conn, rx) = connection(4);
        drop(rx);

        assert!(!conn.send(Arc::new("late".to_string())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn liveness_flag_is_consumed_by_check() {
        let (conn, _rx) = connection(1);

        assert!(conn.check_alive());
        assert!(!conn.check_alive());

        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn mark_alive_refreshes_last_pong() {
        let (conn, _rx) = connection(1);

        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn close_resolves_closed_watchers() {
        let (conn, _rx) = connection(1);
        let conn = Arc::new(conn);

        assert!(!conn.is_closed());

        let watcher = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        conn.close();

        watcher.await.unwrap();
        assert!(conn.is_closed());
    }

    #[test]
    fn connection_ids_are_unique() {
        let (a, _rx_a) = connection(1);
        let (b, _rx_b) = connection(1);

        assert!(a.id.starts_with("conn_"));
        assert_ne!(a.id, b.id);
    }
}
