//! Attempt activity flows.
//!
//! Every operation resolves the student's attempt through the persisted
//! session/student pair, takes that attempt's lock, reloads under it, and
//! persists before echoing to teachers. The attempt lock never nests inside
//! a session lock (or the other way round), so the two scopes cannot
//! deadlock.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{instrument, warn};
use vigil_core::{
    Attempt, DomainError, PassageId, QuestionId, Result, SessionId, TextHighlight, UserId,
    ViolationKind, remaining_seconds,
};
use vigil_store::SessionStore;
use vigil_wire::{ServerEvent, wire_timestamp};

use crate::errors::store_to_domain;
use crate::events::{Audience, EventBus};
use crate::locks::LockMap;
use crate::scoring::Scoring;

/// Payload for recording a highlight.
pub struct NewHighlight {
    /// Passage the text belongs to.
    pub passage_id: PassageId,
    /// Highlighted text.
    pub text: String,
    /// Start offset within the passage.
    pub position_start: u32,
    /// End offset within the passage.
    pub position_end: u32,
    /// Client color code.
    pub color_code: String,
    /// Optional note.
    pub comment: Option<String>,
}

/// Attempt activity flows: answers, violations, highlights, progress,
/// submission.
pub struct AttemptFlows {
    store: Arc<SessionStore>,
    locks: Arc<LockMap>,
    bus: Arc<EventBus>,
    scoring: Arc<dyn Scoring>,
}

impl AttemptFlows {
    /// Wire up the flows.
    pub fn new(
        store: Arc<SessionStore>,
        locks: Arc<LockMap>,
        bus: Arc<EventBus>,
        scoring: Arc<dyn Scoring>,
    ) -> Self {
        Self {
            store,
            locks,
            bus,
            scoring,
        }
    }

    /// Store or replace a student's answer and echo it to teachers.
    #[instrument(
        skip(self, value),
        fields(session_id = %session_id, student_id = %student_id, question_id = %question_id)
    )]
    pub async fn submit_answer(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
        question_id: QuestionId,
        value: Value,
    ) -> Result<()> {
        let (mut attempt, _guard) = self.lock_attempt(session_id, student_id).await?;
        let now = Utc::now();
        attempt.submit_answer(question_id.clone(), value.clone(), now)?;
        self.store
            .update_attempt(&attempt)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Teachers,
            ServerEvent::AnswerSubmitted {
                session_id: session_id.clone(),
                student_id: student_id.clone(),
                question_id,
                value,
                answered_at: wire_timestamp(now),
            },
        );
        Ok(())
    }

    /// Append a proctoring violation and echo the running total to teachers.
    #[instrument(skip(self), fields(session_id = %session_id, student_id = %student_id))]
    pub async fn record_violation(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
        kind: ViolationKind,
    ) -> Result<()> {
        let (mut attempt, _guard) = self.lock_attempt(session_id, student_id).await?;
        let now = Utc::now();
        attempt.record_violation(kind, now)?;
        self.store
            .update_attempt(&attempt)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Teachers,
            ServerEvent::TabViolation {
                session_id: session_id.clone(),
                student_id: student_id.clone(),
                kind,
                violation_count: attempt.violation_count(),
                timestamp: wire_timestamp(now),
            },
        );
        Ok(())
    }

    /// Append to the highlight log and echo the stored record, server id
    /// and timestamp included.
    #[instrument(
        skip(self, highlight),
        fields(session_id = %session_id, student_id = %student_id)
    )]
    pub async fn record_highlight(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
        highlight: NewHighlight,
    ) -> Result<TextHighlight> {
        let (mut attempt, _guard) = self.lock_attempt(session_id, student_id).await?;
        let now = Utc::now();
        let stored = attempt.record_highlight(
            highlight.passage_id,
            highlight.text,
            highlight.position_start,
            highlight.position_end,
            highlight.color_code,
            highlight.comment,
            now,
        )?;
        self.store
            .update_attempt(&attempt)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Teachers,
            ServerEvent::TextHighlighted {
                session_id: session_id.clone(),
                student_id: student_id.clone(),
                highlight: stored.clone(),
            },
        );
        Ok(stored)
    }

    /// Move the student's reading position and echo it to teachers.
    #[instrument(skip(self), fields(session_id = %session_id, student_id = %student_id))]
    pub async fn update_progress(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
        passage_index: u32,
        question_index: u32,
    ) -> Result<()> {
        let (mut attempt, _guard) = self.lock_attempt(session_id, student_id).await?;
        let now = Utc::now();
        attempt.update_progress(passage_index, question_index, now)?;
        self.store
            .update_attempt(&attempt)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Teachers,
            ServerEvent::ProgressUpdate {
                session_id: session_id.clone(),
                student_id: student_id.clone(),
                passage_index,
                question_index,
                timestamp: wire_timestamp(now),
            },
        );
        Ok(())
    }

    /// IN_PROGRESS → SUBMITTED with a final server-computed time
    /// checkpoint. Echoes to teachers, then hands the frozen record to
    /// scoring outside the lock; a scoring failure is logged and the
    /// submission stands.
    #[instrument(skip(self), fields(session_id = %session_id, student_id = %student_id))]
    pub async fn submit_attempt(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
    ) -> Result<Attempt> {
        let (mut attempt, guard) = self.lock_attempt(session_id, student_id).await?;
        let now = Utc::now();
        let session = self
            .store
            .get_session(session_id)
            .map_err(store_to_domain)?
            .ok_or_else(|| DomainError::not_found("session", session_id.as_str()))?;
        let remaining = remaining_seconds(&session, now)?;
        attempt.update_time_remaining(remaining, now)?;
        attempt.submit(now)?;
        self.store
            .update_attempt(&attempt)
            .map_err(store_to_domain)?;
        self.bus.publish(
            session_id.clone(),
            Audience::Teachers,
            ServerEvent::AttemptSubmitted {
                session_id: session_id.clone(),
                student_id: student_id.clone(),
                attempt_id: attempt.id.clone(),
                submitted_at: wire_timestamp(now),
            },
        );
        drop(guard);
        if let Err(error) = self.scoring.score(&attempt).await {
            warn!(
                attempt_id = %attempt.id,
                %error,
                "scoring hand-off failed; attempt stays submitted"
            );
        }
        Ok(attempt)
    }

    /// Resolve the student's attempt, take its lock, and reload under it.
    ///
    /// The `(session, student) → attempt` binding is write-once, so
    /// resolving before locking cannot race with a re-link; the reload only
    /// refreshes the mutable columns.
    async fn lock_attempt(
        &self,
        session_id: &SessionId,
        student_id: &UserId,
    ) -> Result<(Attempt, OwnedMutexGuard<()>)> {
        let found = self
            .store
            .find_attempt(session_id, student_id)
            .map_err(store_to_domain)?
            .ok_or_else(|| {
                DomainError::not_found("attempt", format!("{session_id}/{student_id}"))
            })?;
        let guard = self.locks.acquire(found.id.as_str()).await;
        let attempt = self
            .store
            .get_attempt(&found.id)
            .map_err(store_to_domain)?
            .ok_or_else(|| DomainError::not_found("attempt", found.id.as_str()))?;
        Ok((attempt, guard))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
