//! Error types for the persistence layer.
//!
//! [`StoreError`] is the primary error type returned by all store
//! operations. Infrastructure failures convert from their source crates;
//! row-version misses and missing rows get their own variants so callers
//! can translate them into domain errors.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Requested attempt was not found.
    #[error("attempt not found: {0}")]
    AttemptNotFound(String),

    /// Optimistic version check failed; another writer got there first.
    #[error("{entity} {id} version conflict")]
    Conflict {
        /// Entity kind ("session", "attempt").
        entity: &'static str,
        /// Row that hit the version check.
        id: String,
    },

    /// A stored row could not be decoded back into a domain value.
    #[error("corrupt row: {message}")]
    Corrupt {
        /// Which column failed and why.
        message: String,
    },
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_display() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn serde_error_display() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = StoreError::Serde(serde_err);
        assert!(err.to_string().contains("serde error"));
    }

    #[test]
    fn conflict_display() {
        let err = StoreError::Conflict {
            entity: "session",
            id: "sess_1".into(),
        };
        assert_eq!(err.to_string(), "session sess_1 version conflict");
    }

    #[test]
    fn not_found_display() {
        let err = StoreError::SessionNotFound("sess_9".into());
        assert_eq!(err.to_string(), "session not found: sess_9");
        let err = StoreError::AttemptNotFound("att_9".into());
        assert_eq!(err.to_string(), "attempt not found: att_9");
    }

    #[test]
    fn corrupt_display() {
        let err = StoreError::Corrupt {
            message: "bad timestamp in started_at".into(),
        };
        assert!(err.to_string().starts_with("corrupt row:"));
    }

    #[test]
    fn from_rusqlite_error() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
