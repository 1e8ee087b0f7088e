//! High-level [`SessionStore`] facade.
//!
//! Wraps the connection pool and repositories behind domain-typed methods.
//! Reads decode rows back into aggregates; writes encode aggregates and
//! are guarded by the optimistic version column, so a stale writer gets
//! [`StoreError::Conflict`] instead of silently clobbering newer state.

use tracing::debug;
use vigil_core::{Attempt, AttemptId, Session, SessionId, UserId};

use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::{AttemptRepo, SessionRepo};
use crate::repositories::session::ListSessionsOptions;
use crate::row_types::{AttemptRow, SessionRow};

/// Persistent store for sessions and attempts.
pub struct SessionStore {
    pool: ConnectionPool,
}

impl SessionStore {
    /// Open an in-memory store (for testing). Runs migrations.
    pub fn new_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        let store = Self { pool };
        let conn = store.conn()?;
        let _ = run_migrations(&conn)?;
        Ok(store)
    }

    /// Open a file-backed store. Runs migrations.
    pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let store = Self { pool };
        let conn = store.conn()?;
        let applied = run_migrations(&conn)?;
        debug!(path, applied, "session store opened");
        Ok(store)
    }

    /// The underlying pool, for components that need their own connection.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ── Sessions ─────────────────────────────────────────────────────────────

    /// Persist a freshly created session.
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn()?;
        let row = SessionRow::from_session(session)?;
        SessionRepo::insert(&conn, &row)
    }

    /// Load a session by ID.
    pub fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let conn = self.conn()?;
        match SessionRepo::get_by_id(&conn, id.as_str())? {
            Some(row) => Ok(Some(row.into_session()?)),
            None => Ok(None),
        }
    }

    /// Persist a mutated session.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the row moved past `session.version`,
    /// [`StoreError::SessionNotFound`] when the row does not exist.
    pub fn update_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn()?;
        let row = SessionRow::from_session(session)?;
        if SessionRepo::update(&conn, &row)? {
            return Ok(());
        }
        if SessionRepo::exists(&conn, row.id.as_str())? {
            Err(StoreError::Conflict {
                entity: "session",
                id: row.id,
            })
        } else {
            Err(StoreError::SessionNotFound(row.id))
        }
    }

    /// List sessions with filtering.
    pub fn list_sessions(&self, opts: &ListSessionsOptions<'_>) -> Result<Vec<Session>> {
        let conn = self.conn()?;
        SessionRepo::list(&conn, opts)?
            .into_iter()
            .map(SessionRow::into_session)
            .collect()
    }

    // ── Attempts ─────────────────────────────────────────────────────────────

    /// Persist a freshly created attempt.
    pub fn insert_attempt(&self, attempt: &Attempt) -> Result<()> {
        let conn = self.conn()?;
        let row = AttemptRow::from_attempt(attempt)?;
        AttemptRepo::insert(&conn, &row)
    }

    /// Load an attempt by ID.
    pub fn get_attempt(&self, id: &AttemptId) -> Result<Option<Attempt>> {
        let conn = self.conn()?;
        match AttemptRepo::get_by_id(&conn, id.as_str())? {
            Some(row) => Ok(Some(row.into_attempt()?)),
            None => Ok(None),
        }
    }

    /// Load the attempt a student holds in a session, if any.
    pub fn find_attempt(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
    ) -> Result<Option<Attempt>> {
        let conn = self.conn()?;
        let row = AttemptRepo::get_by_session_and_student(
            &conn,
            session_id.as_str(),
            student_id.as_str(),
        )?;
        match row {
            Some(row) => Ok(Some(row.into_attempt()?)),
            None => Ok(None),
        }
    }

    /// Persist a mutated attempt.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the row moved past `attempt.version`,
    /// [`StoreError::AttemptNotFound`] when the row does not exist.
    pub fn update_attempt(&self, attempt: &Attempt) -> Result<()> {
        let conn = self.conn()?;
        let row = AttemptRow::from_attempt(attempt)?;
        if AttemptRepo::update(&conn, &row)? {
            return Ok(());
        }
        if AttemptRepo::exists(&conn, row.id.as_str())? {
            Err(StoreError::Conflict {
                entity: "attempt",
                id: row.id,
            })
        } else {
            Err(StoreError::AttemptNotFound(row.id))
        }
    }

    /// All attempts recorded for a session.
    pub fn list_session_attempts(&self, session_id: &SessionId) -> Result<Vec<Attempt>> {
        let conn = self.conn()?;
        AttemptRepo::list_by_session(&conn, session_id.as_str())?
            .into_iter()
            .map(AttemptRow::into_attempt)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use vigil_core::{
        ClassId, ConnectionStatus, QuestionId, SessionStatus, TestId, ViolationKind,
    };

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn sample_session() -> Session {
        Session::new(
            SessionId::from_string("sess_1"),
            ClassId::from_string("class_1"),
            TestId::from_string("test_1"),
            "Unit 4 Reading",
            1800,
            t0(),
            vec![UserId::from_string("user_1"), UserId::from_string("user_2")],
            UserId::from_string("user_teacher"),
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn session_round_trip() {
        let store = SessionStore::new_in_memory().unwrap();
        let session = sample_session();
        store.insert_session(&session).unwrap();

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Scheduled);
        assert_eq!(loaded.participants.len(), 2);
        assert_eq!(loaded.duration_seconds, 1800);
        assert!(loaded
            .participants
            .iter()
            .all(|p| p.connection_status == ConnectionStatus::Disconnected));
    }

    #[test]
    fn get_missing_session() {
        let store = SessionStore::new_in_memory().unwrap();
        assert!(store
            .get_session(&SessionId::from_string("sess_missing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn update_session_persists_roster_changes() {
        let store = SessionStore::new_in_memory().unwrap();
        let mut session = sample_session();
        store.insert_session(&session).unwrap();

        session.open_waiting_room(t0()).unwrap();
        let student = UserId::from_string("user_1");
        session.student_join(&student, t0()).unwrap();
        store.update_session(&session).unwrap();

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::WaitingForStudents);
        assert_eq!(loaded.connected_count(), 1);
        assert_eq!(loaded.version, 2);
    }

    #[test]
    fn stale_session_write_is_a_conflict() {
        let store = SessionStore::new_in_memory().unwrap();
        let session = sample_session();
        store.insert_session(&session).unwrap();

        let mut first = store.get_session(&session.id).unwrap().unwrap();
        let mut second = store.get_session(&session.id).unwrap().unwrap();

        first.open_waiting_room(t0()).unwrap();
        store.update_session(&first).unwrap();

        second.open_waiting_room(t0()).unwrap();
        let err = store.update_session(&second).unwrap_err();
        assert_matches!(err, StoreError::Conflict { entity: "session", .. });
    }

    #[test]
    fn update_missing_session_is_not_found() {
        let store = SessionStore::new_in_memory().unwrap();
        let err = store.update_session(&sample_session()).unwrap_err();
        assert_matches!(err, StoreError::SessionNotFound(_));
    }

    #[test]
    fn list_sessions_by_status() {
        let store = SessionStore::new_in_memory().unwrap();
        let mut a = sample_session();
        store.insert_session(&a).unwrap();
        a.open_waiting_room(t0()).unwrap();
        store.update_session(&a).unwrap();

        let mut b = sample_session();
        b.id = SessionId::from_string("sess_2");
        store.insert_session(&b).unwrap();

        let waiting = store
            .list_sessions(&ListSessionsOptions {
                status: Some("WAITING_FOR_STUDENTS"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, a.id);
    }

    #[test]
    fn attempt_round_trip_preserves_activity() {
        let store = SessionStore::new_in_memory().unwrap();
        let session = sample_session();
        store.insert_session(&session).unwrap();

        let mut attempt = Attempt::new(
            AttemptId::from_string("att_1"),
            session.id.clone(),
            UserId::from_string("user_1"),
            session.test_id.clone(),
            t0(),
        );
        store.insert_attempt(&attempt).unwrap();

        attempt
            .submit_answer(QuestionId::from_string("q_1"), json!("B"), t0())
            .unwrap();
        attempt
            .record_violation(ViolationKind::TabSwitch, t0())
            .unwrap();
        let highlight = attempt
            .record_highlight(
                vigil_core::PassageId::from_string("psg_1"),
                "marked text",
                4,
                15,
                "yellow",
                None,
                t0(),
            )
            .unwrap();
        store.update_attempt(&attempt).unwrap();

        let loaded = store.get_attempt(&attempt.id).unwrap().unwrap();
        assert_eq!(loaded.answers.len(), 1);
        assert_eq!(loaded.violation_count(), 1);
        assert_eq!(loaded.highlights, vec![highlight]);
        assert_eq!(loaded.version, 2);
    }

    #[test]
    fn find_attempt_by_session_and_student() {
        let store = SessionStore::new_in_memory().unwrap();
        let session = sample_session();
        store.insert_session(&session).unwrap();

        let attempt = Attempt::new(
            AttemptId::from_string("att_1"),
            session.id.clone(),
            UserId::from_string("user_1"),
            session.test_id.clone(),
            t0(),
        );
        store.insert_attempt(&attempt).unwrap();

        let found = store
            .find_attempt(&session.id, &UserId::from_string("user_1"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, attempt.id);

        assert!(store
            .find_attempt(&session.id, &UserId::from_string("user_2"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn stale_attempt_write_is_a_conflict() {
        let store = SessionStore::new_in_memory().unwrap();
        let session = sample_session();
        store.insert_session(&session).unwrap();

        let attempt = Attempt::new(
            AttemptId::from_string("att_1"),
            session.id.clone(),
            UserId::from_string("user_1"),
            session.test_id.clone(),
            t0(),
        );
        store.insert_attempt(&attempt).unwrap();

        let mut first = store.get_attempt(&attempt.id).unwrap().unwrap();
        let mut second = store.get_attempt(&attempt.id).unwrap().unwrap();

        first.update_progress(1, 1, t0()).unwrap();
        store.update_attempt(&first).unwrap();

        second.update_progress(2, 2, t0()).unwrap();
        let err = store.update_attempt(&second).unwrap_err();
        assert_matches!(err, StoreError::Conflict { entity: "attempt", .. });
    }

    #[test]
    fn list_session_attempts() {
        let store = SessionStore::new_in_memory().unwrap();
        let session = sample_session();
        store.insert_session(&session).unwrap();

        for (att, student) in [("att_1", "user_1"), ("att_2", "user_2")] {
            store
                .insert_attempt(&Attempt::new(
                    AttemptId::from_string(att),
                    session.id.clone(),
                    UserId::from_string(student),
                    session.test_id.clone(),
                    t0(),
                ))
                .unwrap();
        }

        let attempts = store.list_session_attempts(&session.id).unwrap();
        assert_eq!(attempts.len(), 2);
    }
}
