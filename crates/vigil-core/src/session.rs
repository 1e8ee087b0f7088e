//! Live test-session aggregate.
//!
//! A [`Session`] owns the lifecycle state machine and the participant
//! roster. The roster is fixed at creation; joins only flip connection
//! status for students already on it. All mutators take `now` from the
//! caller so the aggregate never reads a clock.
//!
//! Legal status transitions:
//!
//! ```text
//! SCHEDULED ──▶ WAITING_FOR_STUDENTS ──▶ IN_PROGRESS ──▶ COMPLETED
//!     │                 │
//!     └────────┬────────┘
//!              ▼
//!          CANCELLED
//! ```

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, Result};
use crate::ids::{AttemptId, ClassId, SessionId, TestId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Status enums
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Created, waiting room not yet open.
    Scheduled,
    /// Waiting room open, students may join.
    WaitingForStudents,
    /// Test running, timer counting down.
    InProgress,
    /// Finished normally.
    Completed,
    /// Called off before it started.
    Cancelled,
}

impl SessionStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "SCHEDULED",
            Self::WaitingForStudents => "WAITING_FOR_STUDENTS",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Live connection state of one roster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// Student currently holds a registered connection.
    Connected,
    /// No live connection for this student.
    Disconnected,
}

/// Authenticated role attached to a connection token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Runs the session and observes live activity.
    Teacher,
    /// Takes the test.
    Student,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Teacher => f.write_str("teacher"),
            Self::Student => f.write_str("student"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Participant
// ─────────────────────────────────────────────────────────────────────────────

/// One roster entry. Created DISCONNECTED with no attempt; `joined_at`
/// records the first successful join and survives reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParticipant {
    /// Roster member.
    pub student_id: UserId,
    /// Attempt linked once the test starts for this student. Write-once.
    pub attempt_id: Option<AttemptId>,
    /// Live connection state.
    pub connection_status: ConnectionStatus,
    /// First successful join, if any.
    pub joined_at: Option<DateTime<Utc>>,
    /// Last join or disconnect observed for this student.
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionParticipant {
    fn new(student_id: UserId) -> Self {
        Self {
            student_id,
            attempt_id: None,
            connection_status: ConnectionStatus::Disconnected,
            joined_at: None,
            last_activity_at: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// A scheduled run of a test for one class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// Class whose roster seeds the participant list.
    pub class_id: ClassId,
    /// Test being administered.
    pub test_id: TestId,
    /// Human-readable title.
    pub title: String,
    /// Total allotted time, in seconds. Fixed at creation.
    pub duration_seconds: i64,
    /// When the session is planned to run.
    pub scheduled_at: DateTime<Utc>,
    /// Set by [`Session::start`].
    pub started_at: Option<DateTime<Utc>>,
    /// Set by [`Session::complete`].
    pub completed_at: Option<DateTime<Utc>>,
    /// Current lifecycle phase.
    pub status: SessionStatus,
    /// Fixed roster with live connection state.
    pub participants: Vec<SessionParticipant>,
    /// Teacher who created the session.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency stamp. Starts at 1; the store bumps it on
    /// every persisted update and rejects stale writers.
    pub version: i64,
}

impl Session {
    /// Create a SCHEDULED session with every roster member DISCONNECTED.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] when the duration is not positive,
    /// the roster is empty, or the roster repeats a student.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        class_id: ClassId,
        test_id: TestId,
        title: impl Into<String>,
        duration_seconds: i64,
        scheduled_at: DateTime<Utc>,
        roster: Vec<UserId>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if duration_seconds <= 0 {
            return Err(DomainError::validation(format!(
                "duration must be positive, got {duration_seconds}"
            )));
        }
        if roster.is_empty() {
            return Err(DomainError::validation("roster must not be empty"));
        }
        let mut seen = HashSet::with_capacity(roster.len());
        for student_id in &roster {
            if !seen.insert(student_id.as_str()) {
                return Err(DomainError::validation(format!(
                    "student {student_id} appears twice in the roster"
                )));
            }
        }

        Ok(Self {
            id,
            class_id,
            test_id,
            title: title.into(),
            duration_seconds,
            scheduled_at,
            started_at: None,
            completed_at: None,
            status: SessionStatus::Scheduled,
            participants: roster.into_iter().map(SessionParticipant::new).collect(),
            created_by,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// SCHEDULED → WAITING_FOR_STUDENTS.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] from any other status.
    pub fn open_waiting_room(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::Scheduled {
            return Err(self.bad_transition("open waiting room", "SCHEDULED"));
        }
        self.status = SessionStatus::WaitingForStudents;
        self.updated_at = now;
        Ok(())
    }

    /// Mark a roster member CONNECTED.
    ///
    /// Returns `Ok(true)` when the student transitioned to CONNECTED and
    /// `Ok(false)` when they already were (duplicate join is a no-op).
    /// `joined_at` keeps the first join time across reconnects.
    ///
    /// # Errors
    ///
    /// [`DomainError::State`] outside WAITING_FOR_STUDENTS / IN_PROGRESS,
    /// [`DomainError::NotFound`] for a student not on the roster.
    pub fn student_join(&mut self, student_id: &UserId, now: DateTime<Utc>) -> Result<bool> {
        if !matches!(
            self.status,
            SessionStatus::WaitingForStudents | SessionStatus::InProgress
        ) {
            return Err(self.bad_transition("join", "WAITING_FOR_STUDENTS or IN_PROGRESS"));
        }
        let participant = self
            .participant_mut(student_id)
            .ok_or_else(|| DomainError::not_found("student", student_id.as_str()))?;

        if participant.connection_status == ConnectionStatus::Connected {
            return Ok(false);
        }
        participant.connection_status = ConnectionStatus::Connected;
        if participant.joined_at.is_none() {
            participant.joined_at = Some(now);
        }
        participant.last_activity_at = Some(now);
        self.updated_at = now;
        Ok(true)
    }

    /// Mark a roster member DISCONNECTED.
    ///
    /// Never fails: unknown students, terminal sessions, and students who
    /// are already disconnected all return `false` unchanged. Connection
    /// cleanup must always be safe to run.
    pub fn student_disconnect(&mut self, student_id: &UserId, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let Some(participant) = self.participant_mut(student_id) else {
            return false;
        };
        if participant.connection_status == ConnectionStatus::Disconnected {
            return false;
        }
        participant.connection_status = ConnectionStatus::Disconnected;
        participant.last_activity_at = Some(now);
        self.updated_at = now;
        true
    }

    /// WAITING_FOR_STUDENTS → IN_PROGRESS. Stamps `started_at` and returns
    /// the students connected at the moment the test began.
    ///
    /// # Errors
    ///
    /// [`DomainError::State`] from any other status or when nobody is
    /// connected; the session is left unchanged in both cases.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<Vec<UserId>> {
        if self.status != SessionStatus::WaitingForStudents {
            return Err(self.bad_transition("start", "WAITING_FOR_STUDENTS"));
        }
        let connected = self.connected_students();
        if connected.is_empty() {
            return Err(DomainError::state(format!(
                "session {} has no connected students to start with",
                self.id
            )));
        }
        self.status = SessionStatus::InProgress;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(connected)
    }

    /// Attach an attempt to a roster member. Write-once.
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] for a student not on the roster,
    /// [`DomainError::State`] when an attempt is already linked.
    pub fn link_attempt(
        &mut self,
        student_id: &UserId,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = self.id.clone();
        let participant = self
            .participant_mut(student_id)
            .ok_or_else(|| DomainError::not_found("student", student_id.as_str()))?;
        if let Some(existing) = &participant.attempt_id {
            return Err(DomainError::state(format!(
                "student {student_id} in session {session_id} already has attempt {existing}"
            )));
        }
        participant.attempt_id = Some(attempt_id);
        self.updated_at = now;
        Ok(())
    }

    /// IN_PROGRESS → COMPLETED. Stamps `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] from any other status.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != SessionStatus::InProgress {
            return Err(self.bad_transition("complete", "IN_PROGRESS"));
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// SCHEDULED or WAITING_FOR_STUDENTS → CANCELLED. A session that has
    /// started can only be completed.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] from any other status.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !matches!(
            self.status,
            SessionStatus::Scheduled | SessionStatus::WaitingForStudents
        ) {
            return Err(self.bad_transition("cancel", "SCHEDULED or WAITING_FOR_STUDENTS"));
        }
        self.status = SessionStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Roster entry for a student, if present.
    #[must_use]
    pub fn participant(&self, student_id: &UserId) -> Option<&SessionParticipant> {
        self.participants
            .iter()
            .find(|p| &p.student_id == student_id)
    }

    /// Whether a student is on the fixed roster.
    #[must_use]
    pub fn is_in_roster(&self, student_id: &UserId) -> bool {
        self.participant(student_id).is_some()
    }

    /// IDs of every currently CONNECTED participant, in roster order.
    #[must_use]
    pub fn connected_students(&self) -> Vec<UserId> {
        self.participants
            .iter()
            .filter(|p| p.connection_status == ConnectionStatus::Connected)
            .map(|p| p.student_id.clone())
            .collect()
    }

    /// Count of currently CONNECTED participants.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.connection_status == ConnectionStatus::Connected)
            .count()
    }

    fn participant_mut(&mut self, student_id: &UserId) -> Option<&mut SessionParticipant> {
        self.participants
            .iter_mut()
            .find(|p| &p.student_id == student_id)
    }

    fn bad_transition(&self, action: &str, wanted: &str) -> DomainError {
        DomainError::state(format!(
            "cannot {action} session {} in status {}; requires {wanted}",
            self.id, self.status
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
