//! # vigil-runtime
//!
//! Operation flows tying the domain aggregates to persistence and fan-out.
//!
//! - **Locks**: one async mutex per session id and, separately, per attempt
//!   id, held across read → transition → persist
//! - **Flows**: session lifecycle and attempt activity operations
//! - **Event bus**: committed events tagged with a delivery audience,
//!   consumed by the connection layer's bridge
//! - **Scoring**: post-submission hand-off port
//! - **State sync**: full recovery snapshots for reconnecting clients

#![deny(unsafe_code)]

mod errors;

pub mod events;
pub mod flows;
pub mod locks;
pub mod scoring;
pub mod sync;

pub use events::{Audience, EventBus, OutboundEvent};
pub use flows::{AttemptFlows, NewHighlight, NewSession, SessionFilter, SessionFlows};
pub use locks::LockMap;
pub use scoring::{NoopScoring, Scoring};
pub use sync::StateSync;
