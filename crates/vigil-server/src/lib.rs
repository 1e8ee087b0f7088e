//! Real-time server for live test sessions.
//!
//! Serves a small HTTP surface (health, session CRUD) and the WebSocket
//! endpoint every proctored client attaches to. Inbound events are
//! role-gated and routed to the flows in `vigil-runtime`; outbound
//! events ride the in-process bus and fan out to live sockets through
//! the connection registry.

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{Identity, JwtVerifier, TokenVerifier};
pub use config::ServerConfig;
pub use server::{AppState, VigilServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::event_bridge::EventBridge;
pub use websocket::registry::ConnectionRegistry;
pub use websocket::router::EventRouter;
