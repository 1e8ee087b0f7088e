//! Raw database row structs and conversions to and from domain aggregates.
//!
//! Rows hold exactly what `SQLite` stores: RFC 3339 timestamp strings,
//! status text, and JSON blobs for nested collections. All decoding
//! failures surface as [`StoreError::Corrupt`] with the offending column.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use vigil_core::{Attempt, AttemptId, ClassId, Session, SessionId, TestId, UserId};

use crate::errors::{Result, StoreError};

/// Raw `sessions` table row.
#[derive(Clone, Debug)]
pub struct SessionRow {
    /// Primary key.
    pub id: String,
    /// Class reference.
    pub class_id: String,
    /// Test reference.
    pub test_id: String,
    /// Title.
    pub title: String,
    /// Allotted seconds.
    pub duration_seconds: i64,
    /// RFC 3339.
    pub scheduled_at: String,
    /// RFC 3339, set once started.
    pub started_at: Option<String>,
    /// RFC 3339, set once completed.
    pub completed_at: Option<String>,
    /// Status text, e.g. `IN_PROGRESS`.
    pub status: String,
    /// JSON array of participants.
    pub participants: String,
    /// Creating teacher.
    pub created_by: String,
    /// RFC 3339.
    pub created_at: String,
    /// RFC 3339.
    pub updated_at: String,
    /// Optimistic concurrency stamp.
    pub version: i64,
}

impl SessionRow {
    /// Encode a domain session for storage.
    pub fn from_session(session: &Session) -> Result<Self> {
        Ok(Self {
            id: session.id.as_str().to_string(),
            class_id: session.class_id.as_str().to_string(),
            test_id: session.test_id.as_str().to_string(),
            title: session.title.clone(),
            duration_seconds: session.duration_seconds,
            scheduled_at: session.scheduled_at.to_rfc3339(),
            started_at: session.started_at.map(|t| t.to_rfc3339()),
            completed_at: session.completed_at.map(|t| t.to_rfc3339()),
            status: session.status.to_string(),
            participants: serde_json::to_string(&session.participants)?,
            created_by: session.created_by.as_str().to_string(),
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
            version: session.version,
        })
    }

    /// Decode back into the domain aggregate.
    pub fn into_session(self) -> Result<Session> {
        Ok(Session {
            id: SessionId::from_string(self.id),
            class_id: ClassId::from_string(self.class_id),
            test_id: TestId::from_string(self.test_id),
            title: self.title,
            duration_seconds: self.duration_seconds,
            scheduled_at: parse_ts(&self.scheduled_at, "sessions.scheduled_at")?,
            started_at: parse_opt_ts(self.started_at.as_deref(), "sessions.started_at")?,
            completed_at: parse_opt_ts(self.completed_at.as_deref(), "sessions.completed_at")?,
            status: parse_enum(&self.status, "sessions.status")?,
            participants: parse_json(&self.participants, "sessions.participants")?,
            created_by: UserId::from_string(self.created_by),
            created_at: parse_ts(&self.created_at, "sessions.created_at")?,
            updated_at: parse_ts(&self.updated_at, "sessions.updated_at")?,
            version: self.version,
        })
    }
}

/// Raw `attempts` table row.
#[derive(Clone, Debug)]
pub struct AttemptRow {
    /// Primary key.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Student taking the test.
    pub student_id: String,
    /// Test reference.
    pub test_id: String,
    /// Status text, e.g. `SUBMITTED`.
    pub status: String,
    /// RFC 3339.
    pub started_at: String,
    /// RFC 3339, set on submission.
    pub submitted_at: Option<String>,
    /// JSON object keyed by question ID.
    pub answers: String,
    /// JSON array.
    pub violations: String,
    /// JSON array.
    pub highlights: String,
    /// Current passage.
    pub passage_index: i64,
    /// Current question.
    pub question_index: i64,
    /// Last timer checkpoint.
    pub time_remaining_seconds: Option<i64>,
    /// RFC 3339.
    pub created_at: String,
    /// RFC 3339.
    pub updated_at: String,
    /// Optimistic concurrency stamp.
    pub version: i64,
}

impl AttemptRow {
    /// Encode a domain attempt for storage.
    pub fn from_attempt(attempt: &Attempt) -> Result<Self> {
        Ok(Self {
            id: attempt.id.as_str().to_string(),
            session_id: attempt.session_id.as_str().to_string(),
            student_id: attempt.student_id.as_str().to_string(),
            test_id: attempt.test_id.as_str().to_string(),
            status: attempt.status.to_string(),
            started_at: attempt.started_at.to_rfc3339(),
            submitted_at: attempt.submitted_at.map(|t| t.to_rfc3339()),
            answers: serde_json::to_string(&attempt.answers)?,
            violations: serde_json::to_string(&attempt.violations)?,
            highlights: serde_json::to_string(&attempt.highlights)?,
            passage_index: i64::from(attempt.passage_index),
            question_index: i64::from(attempt.question_index),
            time_remaining_seconds: attempt.time_remaining_seconds,
            created_at: attempt.created_at.to_rfc3339(),
            updated_at: attempt.updated_at.to_rfc3339(),
            version: attempt.version,
        })
    }

    /// Decode back into the domain aggregate.
    pub fn into_attempt(self) -> Result<Attempt> {
        Ok(Attempt {
            id: AttemptId::from_string(self.id),
            session_id: SessionId::from_string(self.session_id),
            student_id: UserId::from_string(self.student_id),
            test_id: TestId::from_string(self.test_id),
            status: parse_enum(&self.status, "attempts.status")?,
            started_at: parse_ts(&self.started_at, "attempts.started_at")?,
            submitted_at: parse_opt_ts(self.submitted_at.as_deref(), "attempts.submitted_at")?,
            answers: parse_json(&self.answers, "attempts.answers")?,
            violations: parse_json(&self.violations, "attempts.violations")?,
            highlights: parse_json(&self.highlights, "attempts.highlights")?,
            passage_index: to_u32(self.passage_index, "attempts.passage_index")?,
            question_index: to_u32(self.question_index, "attempts.question_index")?,
            time_remaining_seconds: self.time_remaining_seconds,
            created_at: parse_ts(&self.created_at, "attempts.created_at")?,
            updated_at: parse_ts(&self.updated_at, "attempts.updated_at")?,
            version: self.version,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_ts(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            message: format!("bad timestamp in {column}: {e}"),
        })
}

fn parse_opt_ts(value: Option<&str>, column: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(v, column)).transpose()
}

fn parse_enum<T: DeserializeOwned>(value: &str, column: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| {
        StoreError::Corrupt {
            message: format!("bad value in {column}: {e}"),
        }
    })
}

fn parse_json<T: DeserializeOwned>(value: &str, column: &str) -> Result<T> {
    serde_json::from_str(value).map_err(|e| StoreError::Corrupt {
        message: format!("bad JSON in {column}: {e}"),
    })
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        message: format!("negative or oversized value in {column}: {value}"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
