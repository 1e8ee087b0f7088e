//! Server → client events.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vigil_core::{
    Answer, AttemptId, QuestionId, SessionId, SessionStatus, TextHighlight, UserId, ViolationKind,
};

/// Format a timestamp the way every outbound event carries it:
/// RFC 3339 with millisecond precision and a `Z` suffix.
#[must_use]
pub fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The student's current reading position inside a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Passage currently viewed.
    pub passage_index: u32,
    /// Question currently viewed.
    pub question_index: u32,
}

/// Every event the server may push to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Greeting on successful attach.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Session attached to.
        session_id: SessionId,
        /// Authenticated user.
        user_id: UserId,
        /// Server time of the attach.
        timestamp: String,
    },
    /// Heartbeat reply, same connection only.
    Pong {},
    /// The waiting room opened; students may join.
    #[serde(rename_all = "camelCase")]
    WaitingRoomOpened {
        /// Session affected.
        session_id: SessionId,
        /// Server time.
        timestamp: String,
    },
    /// A student's first connection registered.
    #[serde(rename_all = "camelCase")]
    StudentJoined {
        /// Session affected.
        session_id: SessionId,
        /// Student who joined.
        student_id: UserId,
        /// Connected students after the join.
        connected_count: usize,
        /// Server time.
        timestamp: String,
    },
    /// A student's connection dropped.
    #[serde(rename_all = "camelCase")]
    StudentLeft {
        /// Session affected.
        session_id: SessionId,
        /// Student who left.
        student_id: UserId,
        /// Connected students after the departure.
        connected_count: usize,
        /// Server time.
        timestamp: String,
    },
    /// The timed test started.
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        /// Session affected.
        session_id: SessionId,
        /// Authoritative start instant; the timer counts from here.
        started_at: String,
        /// Students connected at the start.
        connected_students: Vec<UserId>,
        /// Server time.
        timestamp: String,
    },
    /// The session completed.
    #[serde(rename_all = "camelCase")]
    SessionCompleted {
        /// Session affected.
        session_id: SessionId,
        /// Completion instant.
        completed_at: String,
        /// Server time.
        timestamp: String,
    },
    /// The session was cancelled before start.
    #[serde(rename_all = "camelCase")]
    SessionCancelled {
        /// Session affected.
        session_id: SessionId,
        /// Server time.
        timestamp: String,
    },
    /// Teacher echo of a stored answer.
    #[serde(rename_all = "camelCase")]
    AnswerSubmitted {
        /// Session affected.
        session_id: SessionId,
        /// Student who answered.
        student_id: UserId,
        /// Question answered.
        question_id: QuestionId,
        /// Stored answer payload.
        value: Value,
        /// When the answer was recorded.
        answered_at: String,
    },
    /// Teacher echo of a proctoring violation.
    #[serde(rename_all = "camelCase")]
    TabViolation {
        /// Session affected.
        session_id: SessionId,
        /// Student involved.
        student_id: UserId,
        /// What the client observed.
        kind: ViolationKind,
        /// Total violations for this attempt, after recording.
        violation_count: usize,
        /// Server time.
        timestamp: String,
    },
    /// Teacher echo of a stored highlight.
    #[serde(rename_all = "camelCase")]
    TextHighlighted {
        /// Session affected.
        session_id: SessionId,
        /// Student who highlighted.
        student_id: UserId,
        /// The stored record, id and timestamp included.
        highlight: TextHighlight,
    },
    /// Teacher echo of a reading-position move.
    #[serde(rename_all = "camelCase")]
    ProgressUpdate {
        /// Session affected.
        session_id: SessionId,
        /// Student who moved.
        student_id: UserId,
        /// Passage currently viewed.
        passage_index: u32,
        /// Question currently viewed.
        question_index: u32,
        /// Server time.
        timestamp: String,
    },
    /// Teacher echo of an attempt submission.
    #[serde(rename_all = "camelCase")]
    AttemptSubmitted {
        /// Session affected.
        session_id: SessionId,
        /// Student who submitted.
        student_id: UserId,
        /// Attempt turned in.
        attempt_id: AttemptId,
        /// Submission instant.
        submitted_at: String,
    },
    /// Full state snapshot, requesting student only.
    #[serde(rename_all = "camelCase")]
    StateSyncResponse {
        /// Session lifecycle status.
        session_status: SessionStatus,
        /// Seconds left, computed fresh from the session clock.
        remaining_seconds: i64,
        /// Latest answer per question.
        answers: BTreeMap<QuestionId, Answer>,
        /// Reading position.
        progress: Progress,
        /// Highlight log in arrival order.
        highlights: Vec<TextHighlight>,
        /// Violations recorded so far.
        tab_violation_count: usize,
    },
    /// Error acknowledgement, sender only. Never closes the connection.
    Error {
        /// Machine-readable code (e.g. `STATE_ERROR`).
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl ServerEvent {
    /// Build an error acknowledgement.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The wire `type` tag, for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Pong {} => "pong",
            Self::WaitingRoomOpened { .. } => "waiting_room_opened",
            Self::StudentJoined { .. } => "student_joined",
            Self::StudentLeft { .. } => "student_left",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionCompleted { .. } => "session_completed",
            Self::SessionCancelled { .. } => "session_cancelled",
            Self::AnswerSubmitted { .. } => "answer_submitted",
            Self::TabViolation { .. } => "tab_violation",
            Self::TextHighlighted { .. } => "text_highlighted",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::AttemptSubmitted { .. } => "attempt_submitted",
            Self::StateSyncResponse { .. } => "state_sync_response",
            Self::Error { .. } => "error",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    // ── wire_timestamp ──────────────────────────────────────────────

    #[test]
    fn wire_timestamp_is_rfc3339_millis_zulu() {
        let ts = wire_timestamp(t0());
        assert_eq!(ts, "2026-03-10T09:00:00.000Z");
    }

    // ── Serialization shape ─────────────────────────────────────────

    #[test]
    fn connected_envelope_shape() {
        let event = ServerEvent::Connected {
            session_id: SessionId::from("sess_1"),
            user_id: UserId::from("user_9"),
            timestamp: wire_timestamp(t0()),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "connected");
        assert_eq!(v["data"]["sessionId"], "sess_1");
        assert_eq!(v["data"]["userId"], "user_9");
        assert_eq!(v["data"]["timestamp"], "2026-03-10T09:00:00.000Z");
    }

    #[test]
    fn pong_has_empty_data() {
        let v = serde_json::to_value(ServerEvent::Pong {}).unwrap();
        assert_eq!(v["type"], "pong");
        assert_eq!(v["data"], json!({}));
    }

    #[test]
    fn student_joined_carries_connected_count() {
        let event = ServerEvent::StudentJoined {
            session_id: SessionId::from("sess_1"),
            student_id: UserId::from("stu_2"),
            connected_count: 3,
            timestamp: wire_timestamp(t0()),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "student_joined");
        assert_eq!(v["data"]["studentId"], "stu_2");
        assert_eq!(v["data"]["connectedCount"], 3);
    }

    #[test]
    fn session_started_lists_connected_students() {
        let event = ServerEvent::SessionStarted {
            session_id: SessionId::from("sess_1"),
            started_at: wire_timestamp(t0()),
            connected_students: vec![UserId::from("s1"), UserId::from("s2")],
            timestamp: wire_timestamp(t0()),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["data"]["startedAt"], "2026-03-10T09:00:00.000Z");
        assert_eq!(v["data"]["connectedStudents"], json!(["s1", "s2"]));
    }

    #[test]
    fn tab_violation_echo_shape() {
        let event = ServerEvent::TabViolation {
            session_id: SessionId::from("sess_1"),
            student_id: UserId::from("stu_2"),
            kind: ViolationKind::TabSwitch,
            violation_count: 4,
            timestamp: wire_timestamp(t0()),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["data"]["kind"], "TAB_SWITCH");
        assert_eq!(v["data"]["violationCount"], 4);
    }

    #[test]
    fn state_sync_response_snapshot_shape() {
        let mut answers = BTreeMap::new();
        let q = QuestionId::from("q_1");
        let _ = answers.insert(
            q.clone(),
            Answer {
                question_id: q,
                value: json!("B"),
                answered_at: t0(),
            },
        );
        let event = ServerEvent::StateSyncResponse {
            session_status: SessionStatus::InProgress,
            remaining_seconds: 1340,
            answers,
            progress: Progress {
                passage_index: 2,
                question_index: 7,
            },
            highlights: Vec::new(),
            tab_violation_count: 1,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "state_sync_response");
        assert_eq!(v["data"]["sessionStatus"], "IN_PROGRESS");
        assert_eq!(v["data"]["remainingSeconds"], 1340);
        assert_eq!(v["data"]["answers"]["q_1"]["value"], "B");
        assert_eq!(v["data"]["progress"]["passageIndex"], 2);
        assert_eq!(v["data"]["tabViolationCount"], 1);
    }

    #[test]
    fn error_constructor_shape() {
        let event = ServerEvent::error("STATE_ERROR", "cannot start from SCHEDULED");
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["data"]["code"], "STATE_ERROR");
        assert_eq!(v["data"]["message"], "cannot start from SCHEDULED");
    }

    // ── Round trip (clients parse these) ────────────────────────────

    #[test]
    fn wire_format_student_left_parses_back() {
        let raw = r#"{"type": "student_left", "data": {
            "sessionId": "sess_1", "studentId": "stu_2",
            "connectedCount": 0, "timestamp": "2026-03-10T09:05:00.000Z"}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::StudentLeft {
                connected_count, ..
            } => assert_eq!(connected_count, 0),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn event_type_matches_wire_tag() {
        let event = ServerEvent::SessionCancelled {
            session_id: SessionId::from("sess_1"),
            timestamp: wire_timestamp(t0()),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], event.event_type());
    }
}
