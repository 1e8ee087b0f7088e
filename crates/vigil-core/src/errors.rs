//! Domain error taxonomy.
//!
//! Six kinds cover every failure the session core can produce:
//!
//! - [`DomainError::State`] — an invalid lifecycle/status transition
//! - [`DomainError::NotFound`] — unknown session, attempt, or student
//! - [`DomainError::Authorization`] — role or ownership mismatch
//! - [`DomainError::Validation`] — malformed payload or out-of-range value
//! - [`DomainError::Conflict`] — concurrent persist conflict
//! - [`DomainError::Delivery`] — send failure to one connection
//!
//! Expected conditions (duplicate join, duplicate disconnect) are idempotent
//! no-ops in the aggregates and never surface here.

use thiserror::Error;

/// Stable machine-readable code for a state error.
pub const STATE_ERROR: &str = "STATE_ERROR";
/// Stable machine-readable code for a not-found error.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Stable machine-readable code for an authorization error.
pub const FORBIDDEN: &str = "FORBIDDEN";
/// Stable machine-readable code for a validation error.
pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
/// Stable machine-readable code for a persist conflict.
pub const CONFLICT: &str = "CONFLICT";
/// Stable machine-readable code for a connection delivery failure.
pub const DELIVERY_FAILED: &str = "DELIVERY_FAILED";
/// Stable machine-readable code for an unexpected infrastructure failure.
pub const INTERNAL: &str = "INTERNAL";

/// Result alias used throughout the domain crates.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Error produced by the session real-time core.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An operation was attempted in a lifecycle state that forbids it.
    /// The aggregate is left unchanged.
    #[error("{message}")]
    State {
        /// What was attempted and why it is invalid.
        message: String,
    },

    /// The referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind ("session", "attempt", "student", …).
        entity: &'static str,
        /// The ID that failed to resolve.
        id: String,
    },

    /// The actor is not allowed to perform this operation.
    #[error("{message}")]
    Authorization {
        /// Which rule was violated.
        message: String,
    },

    /// The payload is malformed or a value is out of range.
    #[error("{message}")]
    Validation {
        /// What failed validation.
        message: String,
    },

    /// A concurrent writer updated the same row first.
    #[error("{entity} {id} was modified concurrently")]
    Conflict {
        /// Entity kind ("session", "attempt").
        entity: &'static str,
        /// Row that hit the version check.
        id: String,
    },

    /// Sending to one registered connection failed.
    #[error("delivery to user {user_id} in session {session_id} failed")]
    Delivery {
        /// Session the connection belonged to.
        session_id: String,
        /// User whose handle failed.
        user_id: String,
    },

    /// Storage or other infrastructure failure outside the domain's control.
    #[error("{message}")]
    Internal {
        /// Underlying failure, already formatted.
        message: String,
    },
}

impl DomainError {
    /// Build a [`DomainError::State`].
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Build a [`DomainError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Build a [`DomainError::Authorization`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Build a [`DomainError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a [`DomainError::Conflict`].
    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
        }
    }

    /// Build a [`DomainError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error, used verbatim on the wire.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::State { .. } => STATE_ERROR,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Authorization { .. } => FORBIDDEN,
            Self::Validation { .. } => INVALID_PAYLOAD,
            Self::Conflict { .. } => CONFLICT,
            Self::Delivery { .. } => DELIVERY_FAILED,
            Self::Internal { .. } => INTERNAL,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
