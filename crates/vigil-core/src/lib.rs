//! # vigil-core
//!
//! Domain model for live, timed test sessions.
//!
//! This crate provides the shared vocabulary the rest of the workspace builds
//! on:
//!
//! - **Branded IDs**: `SessionId`, `AttemptId`, `UserId`, … as newtypes for
//!   type safety
//! - **Session**: the lifecycle state machine and participant roster
//! - **Attempt**: one student's monitored activity record (answers,
//!   highlights, violations, progress)
//! - **Timer**: the authoritative remaining-time computation
//! - **Errors**: `DomainError` taxonomy via `thiserror`
//!
//! Every aggregate operation is a synchronous, side-effect-free state
//! transform. Callers supply `now` explicitly and own persistence, which
//! keeps "transition + persist" a single retryable unit.

#![deny(unsafe_code)]

pub mod attempt;
pub mod errors;
pub mod ids;
pub mod session;
pub mod timer;

pub use attempt::{Answer, Attempt, AttemptStatus, TextHighlight, ViolationKind, ViolationRecord};
pub use errors::{DomainError, Result};
pub use ids::{AttemptId, ClassId, HighlightId, PassageId, QuestionId, SessionId, TestId, UserId};
pub use session::{ConnectionStatus, Role, Session, SessionParticipant, SessionStatus};
pub use timer::remaining_seconds;
