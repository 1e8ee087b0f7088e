//! Session lifecycle flows.
//!
//! Each mutating flow is lock → load → transition → persist → publish: the
//! session lock covers everything through the persist, and the publish only
//! enqueues on the bus, so commit order and broadcast order agree without
//! ever holding the lock across socket I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use vigil_core::{
    Attempt, AttemptId, ClassId, DomainError, Result, Session, SessionId, SessionStatus, TestId,
    UserId,
};
use vigil_store::{ListSessionsOptions, SessionStore};
use vigil_wire::{ServerEvent, wire_timestamp};

use crate::errors::store_to_domain;
use crate::events::{Audience, EventBus};
use crate::locks::LockMap;

/// Everything needed to create a session.
pub struct NewSession {
    /// Class whose roster takes the test.
    pub class_id: ClassId,
    /// Test to administer.
    pub test_id: TestId,
    /// Display title.
    pub title: String,
    /// Allotted time in seconds.
    pub duration_seconds: i64,
    /// Planned start.
    pub scheduled_at: DateTime<Utc>,
    /// Student roster captured at creation. Fixed afterwards.
    pub roster: Vec<UserId>,
    /// Teacher creating the session.
    pub created_by: UserId,
}

/// Filter for listing sessions.
#[derive(Clone, Debug, Default)]
pub struct SessionFilter {
    /// Only sessions for this class.
    pub class_id: Option<ClassId>,
    /// Only sessions in this lifecycle status.
    pub status: Option<SessionStatus>,
    /// Maximum results.
    pub limit: Option<i64>,
}

/// Session lifecycle flows: create, open, join, disconnect, start,
/// complete, cancel, plus the read paths the HTTP surface uses.
pub struct SessionFlows {
    store: Arc<SessionStore>,
    locks: Arc<LockMap>,
    bus: Arc<EventBus>,
}

impl SessionFlows {
    /// Wire up the flows.
    pub fn new(store: Arc<SessionStore>, locks: Arc<LockMap>, bus: Arc<EventBus>) -> Self {
        Self { store, locks, bus }
    }

    /// Create a SCHEDULED session from a class roster snapshot.
    #[instrument(skip(self, new), fields(class_id = %new.class_id, test_id = %new.test_id))]
    pub fn create_session(&self, new: NewSession) -> Result<Session> {
        let now = Utc::now();
        let session = Session::new(
            SessionId::new(),
            new.class_id,
            new.test_id,
            new.title,
            new.duration_seconds,
            new.scheduled_at,
            new.roster,
            new.created_by,
            now,
        )?;
        self.store
            .insert_session(&session)
            .map_err(store_to_domain)?;
        debug!(
            session_id = %session.id,
            participants = session.participants.len(),
            "session created"
        );
        Ok(session)
    }

    /// SCHEDULED → WAITING_FOR_STUDENTS; tells attached clients the room
    /// is open.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn open_waiting_room(&self, session_id: &SessionId) -> Result<Session> {
        let _guard = self.locks.acquire(session_id.as_str()).await;
        let now = Utc::now();
        let mut session = self.load(session_id)?;
        session.open_waiting_room(now)?;
        self.store
            .update_session(&session)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Session,
            ServerEvent::WaitingRoomOpened {
                session_id: session_id.clone(),
                timestamp: wire_timestamp(now),
            },
        );
        debug!("waiting room opened");
        Ok(session)
    }

    /// Mark a roster student CONNECTED, creating and linking their attempt
    /// when the test is already running (late join).
    ///
    /// `student_joined` goes out only when the connection state actually
    /// changed; a duplicate join stays silent.
    #[instrument(skip(self), fields(session_id = %session_id, student_id = %student_id))]
    pub async fn student_join(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
    ) -> Result<Session> {
        let _guard = self.locks.acquire(session_id.as_str()).await;
        let now = Utc::now();
        let mut session = self.load(session_id)?;
        let joined = session.student_join(student_id, now)?;

        let linked = if session.status == SessionStatus::InProgress {
            self.ensure_attempt(&mut session, student_id, now)?
        } else {
            false
        };

        if joined || linked {
            self.store
                .update_session(&session)
                .map_err(store_to_domain)?;
        }
        if joined {
            self.bus.publish(
                session_id.clone(),
                Audience::Session,
                ServerEvent::StudentJoined {
                    session_id: session_id.clone(),
                    student_id: student_id.clone(),
                    connected_count: session.connected_count(),
                    timestamp: wire_timestamp(now),
                },
            );
        }
        Ok(session)
    }

    /// Mark a student DISCONNECTED after their connection went away.
    ///
    /// Cleanup path: a missing session, an unknown student, a terminal
    /// session, and a student already marked disconnected all return
    /// `Ok(false)` without touching anything.
    #[instrument(skip(self), fields(session_id = %session_id, student_id = %student_id))]
    pub async fn student_disconnect(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
    ) -> Result<bool> {
        let _guard = self.locks.acquire(session_id.as_str()).await;
        let now = Utc::now();
        let Some(mut session) = self
            .store
            .get_session(session_id)
            .map_err(store_to_domain)?
        else {
            return Ok(false);
        };
        if !session.student_disconnect(student_id, now) {
            return Ok(false);
        }
        self.store
            .update_session(&session)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Session,
            ServerEvent::StudentLeft {
                session_id: session_id.clone(),
                student_id: student_id.clone(),
                connected_count: session.connected_count(),
                timestamp: wire_timestamp(now),
            },
        );
        Ok(true)
    }

    /// WAITING_FOR_STUDENTS → IN_PROGRESS. Opens an attempt for every
    /// connected student and anchors the global countdown at the start
    /// instant.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn start_session(&self, session_id: &SessionId) -> Result<Session> {
        let _guard = self.locks.acquire(session_id.as_str()).await;
        let now = Utc::now();
        let mut session = self.load(session_id)?;
        let connected = session.start(now)?;
        for student_id in &connected {
            let _ = self.ensure_attempt(&mut session, student_id, now)?;
        }
        self.store
            .update_session(&session)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Session,
            ServerEvent::SessionStarted {
                session_id: session_id.clone(),
                started_at: wire_timestamp(now),
                connected_students: connected.clone(),
                timestamp: wire_timestamp(now),
            },
        );
        debug!(students = connected.len(), "session started");
        Ok(session)
    }

    /// IN_PROGRESS → COMPLETED. In-flight attempts stay open: students
    /// submit on their own and an unsubmitted record keeps whatever state
    /// it reached, for audit.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn complete_session(&self, session_id: &SessionId) -> Result<Session> {
        let _guard = self.locks.acquire(session_id.as_str()).await;
        let now = Utc::now();
        let mut session = self.load(session_id)?;
        session.complete(now)?;
        self.store
            .update_session(&session)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Session,
            ServerEvent::SessionCompleted {
                session_id: session_id.clone(),
                completed_at: wire_timestamp(now),
                timestamp: wire_timestamp(now),
            },
        );
        debug!("session completed");
        Ok(session)
    }

    /// SCHEDULED or WAITING_FOR_STUDENTS → CANCELLED.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn cancel_session(&self, session_id: &SessionId) -> Result<Session> {
        let _guard = self.locks.acquire(session_id.as_str()).await;
        let now = Utc::now();
        let mut session = self.load(session_id)?;
        session.cancel(now)?;
        self.store
            .update_session(&session)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Session,
            ServerEvent::SessionCancelled {
                session_id: session_id.clone(),
                timestamp: wire_timestamp(now),
            },
        );
        debug!("session cancelled");
        Ok(session)
    }

    /// Load one session.
    pub fn get_session(&self, session_id: &SessionId) -> Result<Session> {
        self.load(session_id)
    }

    /// List sessions for the HTTP surface, newest scheduled first.
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let status = filter.status.map(|s| s.to_string());
        let opts = ListSessionsOptions {
            status: status.as_deref(),
            class_id: filter.class_id.as_ref().map(|c| c.as_str()),
            limit: filter.limit,
            offset: None,
        };
        self.store.list_sessions(&opts).map_err(store_to_domain)
    }

    /// Give `student_id` a linked attempt if they lack one. Returns whether
    /// the session changed.
    ///
    /// An attempt row may already exist without a link when a crash landed
    /// between the attempt insert and the session write; the find picks it
    /// back up instead of minting a duplicate.
    fn ensure_attempt(
        &self,
        session: &mut Session,
        student_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let participant = session
            .participant(student_id)
            .ok_or_else(|| DomainError::not_found("student", student_id.as_str()))?;
        if participant.attempt_id.is_some() {
            return Ok(false);
        }
        let attempt = match self
            .store
            .find_attempt(&session.id, student_id)
            .map_err(store_to_domain)?
        {
            Some(existing) => existing,
            None => {
                let attempt = Attempt::new(
                    AttemptId::new(),
                    session.id.clone(),
                    student_id.clone(),
                    session.test_id.clone(),
                    now,
                );
                self.store
                    .insert_attempt(&attempt)
                    .map_err(store_to_domain)?;
                attempt
            }
        };
        debug!(attempt_id = %attempt.id, student_id = %student_id, "attempt linked");
        session.link_attempt(student_id, attempt.id, now)?;
        Ok(true)
    }

    fn load(&self, session_id: &SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)
            .map_err(store_to_domain)?
            .ok_or_else(|| DomainError::not_found("session", session_id.as_str()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
