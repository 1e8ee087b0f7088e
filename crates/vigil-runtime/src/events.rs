//! Outbound event fan-out channel.
//!
//! Flows publish committed events while still holding the domain lock, so
//! channel order matches commit order for any one session. Actual delivery
//! happens on the subscriber side (the connection layer's bridge task),
//! after the lock is gone, and never blocks a flow on socket I/O.

use tokio::sync::broadcast;
use tracing::debug;
use vigil_core::SessionId;
use vigil_wire::ServerEvent;

/// Who a session-scoped event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection attached to the session.
    Session,
    /// Teacher connections only (live activity echoes).
    Teachers,
}

/// One committed event, tagged with its session and delivery scope.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    /// Session whose connections should receive this.
    pub session_id: SessionId,
    /// Delivery scope within that session.
    pub audience: Audience,
    /// Wire payload.
    pub event: ServerEvent,
}

/// Broadcast channel from flows to connection fan-out.
pub struct EventBus {
    tx: broadcast::Sender<OutboundEvent>,
}

impl EventBus {
    /// Buffered events a slow subscriber may fall behind by before lagging.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a bus with the given per-subscriber buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Open a subscription starting at the next published event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }

    /// Publish a committed event. Dropped silently when nothing subscribes
    /// yet (startup, tests).
    pub fn publish(&self, session_id: SessionId, audience: Audience, event: ServerEvent) {
        debug!(
            session_id = %session_id,
            event_type = event.event_type(),
            "event published"
        );
        let _ = self.tx.send(OutboundEvent {
            session_id,
            audience,
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
