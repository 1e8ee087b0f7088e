//! Bridges the in-process event bus onto live WebSockets.
//!
//! Flows publish [`OutboundEvent`]s without knowing who is connected.
//! The bridge subscribes once and forwards each event to the registry,
//! which fans it out to the audience the publisher named. Lagging only
//! loses broadcasts for this process; clients recover via state sync.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use vigil_runtime::{Audience, OutboundEvent};

use super::registry::ConnectionRegistry;

pub struct EventBridge {
    rx: broadcast::Receiver<OutboundEvent>,
    registry: Arc<ConnectionRegistry>,
}

impl EventBridge {
    pub fn new(rx: broadcast::Receiver<OutboundEvent>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { rx, registry }
    }

    /// Forward bus events until the bus closes.
    #[tracing::instrument(skip_all, name = "event_bridge")]
    pub async fn run(mut self) {
        loop {
            match self.rx.recv().await {
                Ok(outbound) => {
                    debug!(
                        session_id = %outbound.session_id,
                        event_type = outbound.event.event_type(),
                        "forwarding event"
                    );
                    match outbound.audience {
                        Audience::Session => self
                            .registry
                            .broadcast_to_session(&outbound.session_id, &outbound.event),
                        Audience::Teachers => self
                            .registry
                            .broadcast_to_teachers(&outbound.session_id, &outbound.event),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bridge lagged; broadcasts lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("event bus closed; bridge stopping");
                    break;
                }
            }
        }
    }
}
