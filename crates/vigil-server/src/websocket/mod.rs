//! WebSocket support: connection state, the registry, inbound routing,
//! liveness, and the bus-to-socket bridge.

pub mod connection;
pub mod event_bridge;
pub mod heartbeat;
pub mod registry;
pub mod router;
pub mod session;
