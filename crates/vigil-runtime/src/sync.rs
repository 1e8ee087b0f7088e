//! Reconnect state snapshots.
//!
//! A snapshot is assembled purely from persisted rows; connection-registry
//! memory is never consulted. A client that lost everything recovers from
//! this one message instead of replaying event history.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use vigil_core::{DomainError, Result, SessionId, UserId, remaining_seconds};
use vigil_store::SessionStore;
use vigil_wire::{Progress, ServerEvent};

use crate::errors::store_to_domain;

/// Read-side service answering `state_sync_request`.
pub struct StateSync {
    store: Arc<SessionStore>,
}

impl StateSync {
    /// Wire up the service.
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Assemble the full recovery snapshot for one student.
    ///
    /// Remaining time is computed fresh from the session clock at `now`.
    /// Before the test starts the student has no attempt yet; the snapshot
    /// then carries the full duration and empty activity.
    pub fn snapshot(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ServerEvent> {
        let session = self
            .store
            .get_session(session_id)
            .map_err(store_to_domain)?
            .ok_or_else(|| DomainError::not_found("session", session_id.as_str()))?;
        if !session.is_in_roster(student_id) {
            return Err(DomainError::not_found("student", student_id.as_str()));
        }

        let remaining = if session.started_at.is_some() {
            remaining_seconds(&session, now)?
        } else {
            session.duration_seconds
        };

        let attempt = self
            .store
            .find_attempt(session_id, student_id)
            .map_err(store_to_domain)?;

        let event = match attempt {
            Some(attempt) => {
                let tab_violation_count = attempt.violation_count();
                ServerEvent::StateSyncResponse {
                    session_status: session.status,
                    remaining_seconds: remaining,
                    answers: attempt.answers,
                    progress: Progress {
                        passage_index: attempt.passage_index,
                        question_index: attempt.question_index,
                    },
                    highlights: attempt.highlights,
                    tab_violation_count,
                }
            }
            None => ServerEvent::StateSyncResponse {
                session_status: session.status,
                remaining_seconds: remaining,
                answers: BTreeMap::new(),
                progress: Progress {
                    passage_index: 0,
                    question_index: 0,
                },
                highlights: Vec::new(),
                tab_violation_count: 0,
            },
        };
        Ok(event)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
