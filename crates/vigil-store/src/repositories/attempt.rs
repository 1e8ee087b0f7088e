//! Attempt repository.
//!
//! One row per (session, student), enforced by a unique index. Activity
//! collections are JSON columns replaced wholesale, same as the session
//! roster.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::AttemptRow;

/// Attempt repository — stateless, every method takes `&Connection`.
pub struct AttemptRepo;

impl AttemptRepo {
    /// Insert a new attempt row.
    pub fn insert(conn: &Connection, row: &AttemptRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO attempts (id, session_id, student_id, test_id, status,
             started_at, submitted_at, answers, violations, highlights,
             passage_index, question_index, time_remaining_seconds,
             created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                row.id,
                row.session_id,
                row.student_id,
                row.test_id,
                row.status,
                row.started_at,
                row.submitted_at,
                row.answers,
                row.violations,
                row.highlights,
                row.passage_index,
                row.question_index,
                row.time_remaining_seconds,
                row.created_at,
                row.updated_at,
                row.version,
            ],
        )?;
        Ok(())
    }

    /// Get attempt by ID.
    pub fn get_by_id(conn: &Connection, attempt_id: &str) -> Result<Option<AttemptRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM attempts WHERE id = ?1",
                params![attempt_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get the attempt a student holds in a session, if any.
    pub fn get_by_session_and_student(
        conn: &Connection,
        session_id: &str,
        student_id: &str,
    ) -> Result<Option<AttemptRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM attempts WHERE session_id = ?1 AND student_id = ?2",
                params![session_id, student_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Replace every mutable column, guarded by the version the caller read.
    ///
    /// Returns `false` when no row matched — either the attempt is gone or
    /// another writer bumped the version first.
    pub fn update(conn: &Connection, row: &AttemptRow) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE attempts SET status = ?1, submitted_at = ?2, answers = ?3,
             violations = ?4, highlights = ?5, passage_index = ?6,
             question_index = ?7, time_remaining_seconds = ?8, updated_at = ?9,
             version = version + 1
             WHERE id = ?10 AND version = ?11",
            params![
                row.status,
                row.submitted_at,
                row.answers,
                row.violations,
                row.highlights,
                row.passage_index,
                row.question_index,
                row.time_remaining_seconds,
                row.updated_at,
                row.id,
                row.version,
            ],
        )?;
        Ok(changed > 0)
    }

    /// All attempts for a session, in creation order.
    pub fn list_by_session(conn: &Connection, session_id: &str) -> Result<Vec<AttemptRow>> {
        let mut stmt =
            conn.prepare("SELECT * FROM attempts WHERE session_id = ?1 ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Check if attempt exists.
    pub fn exists(conn: &Connection, attempt_id: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM attempts WHERE id = ?1)",
            params![attempt_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttemptRow> {
        Ok(AttemptRow {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            student_id: row.get("student_id")?,
            test_id: row.get("test_id")?,
            status: row.get("status")?,
            started_at: row.get("started_at")?,
            submitted_at: row.get("submitted_at")?,
            answers: row.get("answers")?,
            violations: row.get("violations")?,
            highlights: row.get("highlights")?,
            passage_index: row.get("passage_index")?,
            question_index: row.get("question_index")?,
            time_remaining_seconds: row.get("time_remaining_seconds")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            version: row.get("version")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
