//! Per-student attempt activity recorder.
//!
//! An [`Attempt`] collects everything a student does while a session is
//! live: answers, proctoring violations, text highlights, and reading
//! position. Every recording operation requires the attempt to be
//! IN_PROGRESS; once submitted or abandoned the record is frozen.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DomainError, Result};
use crate::ids::{AttemptId, HighlightId, PassageId, QuestionId, SessionId, TestId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Value types
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    /// Accepting activity.
    InProgress,
    /// Turned in by the student (or by session completion).
    Submitted,
    /// Closed without submission.
    Abandoned,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Submitted => "SUBMITTED",
            Self::Abandoned => "ABANDONED",
        };
        f.write_str(s)
    }
}

/// Kind of proctoring violation reported by the test taker's client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// Browser tab lost focus to another tab.
    TabSwitch,
    /// Window lost focus entirely.
    WindowBlur,
    /// Copy or paste attempted inside the test.
    CopyPaste,
    /// Full-screen mode exited.
    FullScreenExit,
    /// Context menu opened.
    ContextMenu,
}

/// One recorded violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    /// When the client reported it.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: ViolationKind,
}

/// Latest answer for one question. Re-answering replaces the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Question answered.
    pub question_id: QuestionId,
    /// Client-supplied answer payload, stored as-is.
    pub value: Value,
    /// When this value was recorded.
    pub answered_at: DateTime<Utc>,
}

/// A span of passage text the student marked up. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextHighlight {
    /// Highlight ID, generated server-side.
    pub id: HighlightId,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
    /// The highlighted text itself.
    pub text: String,
    /// Passage the span lives in.
    pub passage_id: PassageId,
    /// Span start offset, inclusive.
    pub position_start: u32,
    /// Span end offset, exclusive. Always greater than `position_start`.
    pub position_end: u32,
    /// Display color.
    pub color_code: String,
    /// Optional note attached at creation time.
    pub comment: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempt aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// One student's activity record for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    /// Attempt ID.
    pub id: AttemptId,
    /// Session this attempt belongs to.
    pub session_id: SessionId,
    /// Student taking the test.
    pub student_id: UserId,
    /// Test being taken.
    pub test_id: TestId,
    /// Lifecycle state.
    pub status: AttemptStatus,
    /// When the attempt opened.
    pub started_at: DateTime<Utc>,
    /// Set on submission.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Latest answer per question, keyed by question ID.
    pub answers: BTreeMap<QuestionId, Answer>,
    /// Violations in arrival order.
    pub violations: Vec<ViolationRecord>,
    /// Highlights in arrival order.
    pub highlights: Vec<TextHighlight>,
    /// Passage the student is currently viewing.
    pub passage_index: u32,
    /// Question the student is currently viewing.
    pub question_index: u32,
    /// Last timer checkpoint pushed by the server, if any.
    pub time_remaining_seconds: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency stamp. Starts at 1; the store bumps it on
    /// every persisted update and rejects stale writers.
    pub version: i64,
}

impl Attempt {
    /// Open a fresh IN_PROGRESS attempt with no recorded activity.
    #[must_use]
    pub fn new(
        id: AttemptId,
        session_id: SessionId,
        student_id: UserId,
        test_id: TestId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id,
            student_id,
            test_id,
            status: AttemptStatus::InProgress,
            started_at: now,
            submitted_at: None,
            answers: BTreeMap::new(),
            violations: Vec::new(),
            highlights: Vec::new(),
            passage_index: 0,
            question_index: 0,
            time_remaining_seconds: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Record or replace the answer for a question.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] unless the attempt is IN_PROGRESS.
    pub fn submit_answer(
        &mut self,
        question_id: QuestionId,
        value: Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_in_progress("record an answer")?;
        let answer = Answer {
            question_id: question_id.clone(),
            value,
            answered_at: now,
        };
        let _ = self.answers.insert(question_id, answer);
        self.updated_at = now;
        Ok(())
    }

    /// Append a proctoring violation.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] unless the attempt is IN_PROGRESS.
    pub fn record_violation(&mut self, kind: ViolationKind, now: DateTime<Utc>) -> Result<()> {
        self.ensure_in_progress("record a violation")?;
        self.violations.push(ViolationRecord {
            timestamp: now,
            kind,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Append a text highlight and return the stored record.
    ///
    /// # Errors
    ///
    /// [`DomainError::Validation`] when `start >= end`,
    /// [`DomainError::State`] unless the attempt is IN_PROGRESS.
    #[allow(clippy::too_many_arguments)]
    pub fn record_highlight(
        &mut self,
        passage_id: PassageId,
        text: impl Into<String>,
        start: u32,
        end: u32,
        color: impl Into<String>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TextHighlight> {
        self.ensure_in_progress("record a highlight")?;
        if start >= end {
            return Err(DomainError::validation(format!(
                "highlight range {start}..{end} is empty or inverted"
            )));
        }
        let highlight = TextHighlight {
            id: HighlightId::new(),
            timestamp: now,
            text: text.into(),
            passage_id,
            position_start: start,
            position_end: end,
            color_code: color.into(),
            comment,
        };
        self.highlights.push(highlight.clone());
        self.updated_at = now;
        Ok(highlight)
    }

    /// Move the student's reading position.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] unless the attempt is IN_PROGRESS.
    pub fn update_progress(
        &mut self,
        passage_index: u32,
        question_index: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_in_progress("update progress")?;
        self.passage_index = passage_index;
        self.question_index = question_index;
        self.updated_at = now;
        Ok(())
    }

    /// Checkpoint the server-computed remaining time.
    ///
    /// # Errors
    ///
    /// [`DomainError::Validation`] for a negative value,
    /// [`DomainError::State`] unless the attempt is IN_PROGRESS.
    pub fn update_time_remaining(&mut self, seconds: i64, now: DateTime<Utc>) -> Result<()> {
        self.ensure_in_progress("checkpoint the timer")?;
        if seconds < 0 {
            return Err(DomainError::validation(format!(
                "time remaining must be non-negative, got {seconds}"
            )));
        }
        self.time_remaining_seconds = Some(seconds);
        self.updated_at = now;
        Ok(())
    }

    /// IN_PROGRESS → SUBMITTED. Freezes the record and stamps `submitted_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] unless the attempt is IN_PROGRESS.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_in_progress("submit")?;
        self.status = AttemptStatus::Submitted;
        self.submitted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// IN_PROGRESS → ABANDONED. Freezes the record without submission.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::State`] unless the attempt is IN_PROGRESS.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_in_progress("abandon")?;
        self.status = AttemptStatus::Abandoned;
        self.updated_at = now;
        Ok(())
    }

    /// Total violations recorded so far.
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    fn ensure_in_progress(&self, action: &str) -> Result<()> {
        if self.status != AttemptStatus::InProgress {
            return Err(DomainError::state(format!(
                "cannot {action} on attempt {} in status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn attempt() -> Attempt {
        Attempt::new(
            AttemptId::from_string("att_1"),
            SessionId::from_string("sess_1"),
            UserId::from_string("user_1"),
            TestId::from_string("test_1"),
            t0(),
        )
    }

    #[test]
    fn new_attempt_is_empty_and_in_progress() {
        let attempt = attempt();
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(attempt.answers.is_empty());
        assert!(attempt.violations.is_empty());
        assert!(attempt.highlights.is_empty());
        assert_eq!(attempt.time_remaining_seconds, None);
    }

    #[test]
    fn answers_upsert_by_question() {
        let mut attempt = attempt();
        let q = QuestionId::from_string("q_1");
        attempt.submit_answer(q.clone(), json!("A"), t0()).unwrap();
        attempt
            .submit_answer(QuestionId::from_string("q_2"), json!("C"), t0())
            .unwrap();

        let later = t0() + chrono::Duration::seconds(20);
        attempt.submit_answer(q.clone(), json!("B"), later).unwrap();

        assert_eq!(attempt.answers.len(), 2);
        let replaced = &attempt.answers[&q];
        assert_eq!(replaced.value, json!("B"));
        assert_eq!(replaced.answered_at, later);
    }

    #[test]
    fn violations_append_and_count() {
        let mut attempt = attempt();
        attempt.record_violation(ViolationKind::TabSwitch, t0()).unwrap();
        attempt
            .record_violation(ViolationKind::WindowBlur, t0() + chrono::Duration::seconds(3))
            .unwrap();
        assert_eq!(attempt.violation_count(), 2);
        assert_eq!(attempt.violations[0].kind, ViolationKind::TabSwitch);
        assert_eq!(attempt.violations[1].kind, ViolationKind::WindowBlur);
    }

    #[test]
    fn highlight_rejects_empty_and_inverted_ranges() {
        let mut attempt = attempt();
        let passage = PassageId::from_string("psg_1");

        let inverted =
            attempt.record_highlight(passage.clone(), "x", 10, 5, "yellow", None, t0());
        assert_matches!(inverted, Err(DomainError::Validation { .. }));

        let empty = attempt.record_highlight(passage.clone(), "x", 5, 5, "yellow", None, t0());
        assert_matches!(empty, Err(DomainError::Validation { .. }));

        let minimal = attempt
            .record_highlight(passage, "x", 0, 1, "yellow", None, t0())
            .unwrap();
        assert_eq!((minimal.position_start, minimal.position_end), (0, 1));
        assert_eq!(attempt.highlights.len(), 1);
    }

    #[test]
    fn highlight_keeps_comment_and_generates_id() {
        let mut attempt = attempt();
        let highlight = attempt
            .record_highlight(
                PassageId::from_string("psg_1"),
                "the glacier retreated",
                120,
                141,
                "green",
                Some("key evidence".into()),
                t0(),
            )
            .unwrap();
        assert!(highlight.id.as_str().starts_with("hl_"));
        assert_eq!(highlight.comment.as_deref(), Some("key evidence"));
        assert_eq!(attempt.highlights[0], highlight);
    }

    #[test]
    fn progress_moves_position() {
        let mut attempt = attempt();
        attempt.update_progress(2, 7, t0()).unwrap();
        assert_eq!((attempt.passage_index, attempt.question_index), (2, 7));
    }

    #[test]
    fn time_checkpoint_rejects_negative() {
        let mut attempt = attempt();
        assert_matches!(
            attempt.update_time_remaining(-1, t0()),
            Err(DomainError::Validation { .. })
        );
        attempt.update_time_remaining(95, t0()).unwrap();
        assert_eq!(attempt.time_remaining_seconds, Some(95));
    }

    #[test]
    fn submit_freezes_the_record() {
        let mut attempt = attempt();
        let done = t0() + chrono::Duration::seconds(900);
        attempt.submit(done).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Submitted);
        assert_eq!(attempt.submitted_at, Some(done));

        assert_matches!(attempt.submit(done), Err(DomainError::State { .. }));
        assert_matches!(
            attempt.submit_answer(QuestionId::new(), json!("A"), done),
            Err(DomainError::State { .. })
        );
        assert_matches!(
            attempt.record_violation(ViolationKind::CopyPaste, done),
            Err(DomainError::State { .. })
        );
        assert_matches!(
            attempt.record_highlight(PassageId::new(), "x", 0, 1, "yellow", None, done),
            Err(DomainError::State { .. })
        );
        assert_matches!(
            attempt.update_progress(1, 1, done),
            Err(DomainError::State { .. })
        );
        assert_matches!(
            attempt.update_time_remaining(10, done),
            Err(DomainError::State { .. })
        );
        assert_matches!(attempt.abandon(done), Err(DomainError::State { .. }));
    }

    #[test]
    fn abandon_closes_without_submission() {
        let mut attempt = attempt();
        attempt.abandon(t0()).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Abandoned);
        assert_eq!(attempt.submitted_at, None);
    }
}
