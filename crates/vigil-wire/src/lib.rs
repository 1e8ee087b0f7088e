//! # vigil-wire
//!
//! WebSocket wire-format events matching the proctoring client protocol.
//!
//! Both directions share one envelope: `{"type": "...", "data": {...}}`.
//! Each direction is a closed tagged enum, so adding an event kind is a
//! compile-time-checked change and an unknown inbound `type` is a plain
//! deserialization error.

#![deny(unsafe_code)]

mod inbound;
mod outbound;

pub use inbound::ClientEvent;
pub use outbound::{Progress, ServerEvent, wire_timestamp};
