//! Scoring hand-off for submitted attempts.
//!
//! Grading lives outside this system. The runtime only guarantees that the
//! hand-off happens after the submission commits, and that a scoring
//! failure never undoes or blocks the submission itself.

use async_trait::async_trait;
use tracing::debug;
use vigil_core::{Attempt, Result};

/// Receives each submitted attempt for grading.
#[async_trait]
pub trait Scoring: Send + Sync {
    /// Hand a frozen, submitted attempt to the grader.
    async fn score(&self, attempt: &Attempt) -> Result<()>;
}

/// Scoring sink that only records the hand-off in the log.
///
/// The default wiring until a real grader is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScoring;

#[async_trait]
impl Scoring for NoopScoring {
    async fn score(&self, attempt: &Attempt) -> Result<()> {
        debug!(
            attempt_id = %attempt.id,
            answers = attempt.answers.len(),
            "attempt handed to scoring"
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use vigil_core::{AttemptId, SessionId, TestId, UserId};

    use super::*;

    #[tokio::test]
    async fn noop_accepts_any_attempt() {
        let attempt = Attempt::new(
            AttemptId::new(),
            SessionId::new(),
            UserId::new(),
            TestId::new(),
            Utc::now(),
        );
        NoopScoring.score(&attempt).await.unwrap();
    }
}
