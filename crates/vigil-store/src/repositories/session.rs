//! Session repository — full-row reads and versioned whole-row updates.
//!
//! The participant roster is a JSON column replaced wholesale on every
//! update; there is no per-participant SQL.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::SessionRow;

/// Options for listing sessions.
#[derive(Default)]
pub struct ListSessionsOptions<'a> {
    /// Filter by status text, e.g. `IN_PROGRESS`.
    pub status: Option<&'a str>,
    /// Filter by class.
    pub class_id: Option<&'a str>,
    /// Maximum results.
    pub limit: Option<i64>,
    /// Skip results.
    pub offset: Option<i64>,
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session row.
    pub fn insert(conn: &Connection, row: &SessionRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (id, class_id, test_id, title, duration_seconds,
             scheduled_at, started_at, completed_at, status, participants,
             created_by, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.id,
                row.class_id,
                row.test_id,
                row.title,
                row.duration_seconds,
                row.scheduled_at,
                row.started_at,
                row.completed_at,
                row.status,
                row.participants,
                row.created_by,
                row.created_at,
                row.updated_at,
                row.version,
            ],
        )?;
        Ok(())
    }

    /// Get session by ID.
    pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT * FROM sessions WHERE id = ?1",
                params![session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Replace every mutable column, guarded by the version the caller read.
    ///
    /// Returns `false` when no row matched — either the session is gone or
    /// another writer bumped the version first.
    pub fn update(conn: &Connection, row: &SessionRow) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET started_at = ?1, completed_at = ?2, status = ?3,
             participants = ?4, updated_at = ?5, version = version + 1
             WHERE id = ?6 AND version = ?7",
            params![
                row.started_at,
                row.completed_at,
                row.status,
                row.participants,
                row.updated_at,
                row.id,
                row.version,
            ],
        )?;
        Ok(changed > 0)
    }

    /// List sessions with filtering, newest scheduled first.
    pub fn list(conn: &Connection, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        use std::fmt::Write;
        let mut sql = String::from("SELECT * FROM sessions WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = opts.status {
            let _ = write!(sql, " AND status = ?{}", param_values.len() + 1);
            param_values.push(Box::new(status.to_string()));
        }
        if let Some(class_id) = opts.class_id {
            let _ = write!(sql, " AND class_id = ?{}", param_values.len() + 1);
            param_values.push(Box::new(class_id.to_string()));
        }
        sql.push_str(" ORDER BY scheduled_at DESC");
        if let Some(limit) = opts.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        if let Some(offset) = opts.offset {
            let _ = write!(sql, " OFFSET {offset}");
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(Box::as_ref).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Check if session exists.
    pub fn exists(conn: &Connection, session_id: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            id: row.get("id")?,
            class_id: row.get("class_id")?,
            test_id: row.get("test_id")?,
            title: row.get("title")?,
            duration_seconds: row.get("duration_seconds")?,
            scheduled_at: row.get("scheduled_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            status: row.get("status")?,
            participants: row.get("participants")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            version: row.get("version")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn sample_row(id: &str, status: &str) -> SessionRow {
        SessionRow {
            id: id.into(),
            class_id: "class_1".into(),
            test_id: "test_1".into(),
            title: "Unit 4 Reading".into(),
            duration_seconds: 1800,
            scheduled_at: "2025-03-10T09:00:00+00:00".into(),
            started_at: None,
            completed_at: None,
            status: status.into(),
            participants: "[]".into(),
            created_by: "user_teacher".into(),
            created_at: "2025-03-10T08:00:00+00:00".into(),
            updated_at: "2025-03-10T08:00:00+00:00".into(),
            version: 1,
        }
    }

    #[test]
    fn insert_and_get() {
        let conn = setup();
        SessionRepo::insert(&conn, &sample_row("sess_1", "SCHEDULED")).unwrap();

        let found = SessionRepo::get_by_id(&conn, "sess_1").unwrap().unwrap();
        assert_eq!(found.id, "sess_1");
        assert_eq!(found.status, "SCHEDULED");
        assert_eq!(found.duration_seconds, 1800);
        assert_eq!(found.version, 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = setup();
        assert!(SessionRepo::get_by_id(&conn, "sess_nope").unwrap().is_none());
    }

    #[test]
    fn update_replaces_row_and_bumps_version() {
        let conn = setup();
        let mut row = sample_row("sess_1", "SCHEDULED");
        SessionRepo::insert(&conn, &row).unwrap();

        row.status = "WAITING_FOR_STUDENTS".into();
        row.participants = r#"[{"studentId":"user_1"}]"#.into();
        row.updated_at = "2025-03-10T08:30:00+00:00".into();
        assert!(SessionRepo::update(&conn, &row).unwrap());

        let found = SessionRepo::get_by_id(&conn, "sess_1").unwrap().unwrap();
        assert_eq!(found.status, "WAITING_FOR_STUDENTS");
        assert!(found.participants.contains("user_1"));
        assert_eq!(found.version, 2);
    }

    #[test]
    fn stale_version_does_not_write() {
        let conn = setup();
        let mut row = sample_row("sess_1", "SCHEDULED");
        SessionRepo::insert(&conn, &row).unwrap();

        row.status = "WAITING_FOR_STUDENTS".into();
        assert!(SessionRepo::update(&conn, &row).unwrap());

        // Same version again — the row is now at version 2.
        row.status = "CANCELLED".into();
        assert!(!SessionRepo::update(&conn, &row).unwrap());

        let found = SessionRepo::get_by_id(&conn, "sess_1").unwrap().unwrap();
        assert_eq!(found.status, "WAITING_FOR_STUDENTS");
    }

    #[test]
    fn update_missing_returns_false() {
        let conn = setup();
        assert!(!SessionRepo::update(&conn, &sample_row("sess_ghost", "SCHEDULED")).unwrap());
    }

    #[test]
    fn list_filters_by_status() {
        let conn = setup();
        SessionRepo::insert(&conn, &sample_row("sess_1", "SCHEDULED")).unwrap();
        SessionRepo::insert(&conn, &sample_row("sess_2", "IN_PROGRESS")).unwrap();
        SessionRepo::insert(&conn, &sample_row("sess_3", "IN_PROGRESS")).unwrap();

        let rows = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                status: Some("IN_PROGRESS"),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn list_with_limit() {
        let conn = setup();
        for i in 0..5 {
            SessionRepo::insert(&conn, &sample_row(&format!("sess_{i}"), "SCHEDULED")).unwrap();
        }
        let rows = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn exists_session() {
        let conn = setup();
        SessionRepo::insert(&conn, &sample_row("sess_1", "SCHEDULED")).unwrap();
        assert!(SessionRepo::exists(&conn, "sess_1").unwrap());
        assert!(!SessionRepo::exists(&conn, "sess_2").unwrap());
    }
}
