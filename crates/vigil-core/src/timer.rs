//! Authoritative countdown computation.
//!
//! There is one global timer per session, anchored to `started_at` on the
//! server clock. Remaining time is a pure function of the session and the
//! current instant, so every caller computing it at the same moment gets
//! the same value no matter when they joined.

use chrono::{DateTime, Utc};

use crate::errors::{DomainError, Result};
use crate::session::Session;

/// Seconds left on the session clock at `now`, floored at zero.
///
/// # Errors
///
/// Returns [`DomainError::State`] when the session has not started, since
/// there is no anchor to count down from.
pub fn remaining_seconds(session: &Session, now: DateTime<Utc>) -> Result<i64> {
    let started_at = session.started_at.ok_or_else(|| {
        DomainError::state(format!(
            "session {} has not started; no timer is running",
            session.id
        ))
    })?;
    let elapsed = now.signed_duration_since(started_at).num_seconds();
    Ok((session.duration_seconds - elapsed).max(0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::errors::DomainError;
    use crate::ids::{ClassId, SessionId, TestId, UserId};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn started_session(duration_seconds: i64) -> Session {
        let student = UserId::from_string("user_1");
        let mut session = Session::new(
            SessionId::from_string("sess_1"),
            ClassId::from_string("class_1"),
            TestId::from_string("test_1"),
            "t",
            duration_seconds,
            t0(),
            vec![student.clone()],
            UserId::from_string("user_teacher"),
            t0(),
        )
        .unwrap();
        session.open_waiting_room(t0()).unwrap();
        session.student_join(&student, t0()).unwrap();
        let _ = session.start(t0()).unwrap();
        session
    }

    #[test]
    fn counts_down_from_the_start_anchor() {
        let session = started_session(1800);
        assert_eq!(remaining_seconds(&session, t0()).unwrap(), 1800);
        assert_eq!(
            remaining_seconds(&session, t0() + Duration::seconds(1700)).unwrap(),
            100
        );
    }

    #[test]
    fn floors_at_zero_after_expiry() {
        let session = started_session(1800);
        assert_eq!(
            remaining_seconds(&session, t0() + Duration::seconds(1800)).unwrap(),
            0
        );
        assert_eq!(
            remaining_seconds(&session, t0() + Duration::seconds(7200)).unwrap(),
            0
        );
    }

    #[test]
    fn unstarted_session_has_no_timer() {
        let session = Session::new(
            SessionId::new(),
            ClassId::new(),
            TestId::new(),
            "t",
            600,
            t0(),
            vec![UserId::new()],
            UserId::new(),
            t0(),
        )
        .unwrap();
        assert_matches!(
            remaining_seconds(&session, t0()),
            Err(DomainError::State { .. })
        );
    }

    #[test]
    fn same_instant_yields_same_value_regardless_of_caller() {
        // A late joiner asking at the same wall-clock moment as an early
        // joiner must see an identical countdown.
        let session = started_session(1800);
        let at = t0() + Duration::seconds(1700);
        let for_early_joiner = remaining_seconds(&session, at).unwrap();
        let for_late_joiner = remaining_seconds(&session, at).unwrap();
        assert_eq!(for_early_joiner, 100);
        assert_eq!(for_early_joiner, for_late_joiner);
    }
}
