//! Client → server events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vigil_core::{PassageId, QuestionId, Role, ViolationKind};

fn default_color_code() -> String {
    "yellow".to_string()
}

/// Every event a client may send over an attached WebSocket.
///
/// The `data` object is required even when empty, so `heartbeat` is
/// `{"type": "heartbeat", "data": {}}` on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Record (or replace) the answer for one question.
    #[serde(rename_all = "camelCase")]
    AnswerSubmitted {
        /// Question being answered.
        question_id: QuestionId,
        /// Answer payload, stored as-is.
        value: Value,
    },
    /// Report a proctoring violation.
    TabViolation {
        /// What the client observed.
        kind: ViolationKind,
    },
    /// Record a passage text highlight.
    #[serde(rename_all = "camelCase")]
    TextHighlighted {
        /// Passage the span lives in.
        passage_id: PassageId,
        /// The highlighted text.
        text: String,
        /// Span start offset, inclusive.
        position_start: u32,
        /// Span end offset, exclusive.
        position_end: u32,
        /// Display color. Defaults to yellow when omitted.
        #[serde(default = "default_color_code")]
        color_code: String,
        /// Optional note.
        #[serde(default)]
        comment: Option<String>,
    },
    /// Move the student's reading position.
    #[serde(rename_all = "camelCase")]
    ProgressUpdate {
        /// Passage currently viewed.
        passage_index: u32,
        /// Question currently viewed.
        question_index: u32,
    },
    /// Ask for a full state snapshot (reconnect recovery).
    StateSyncRequest {},
    /// Turn in the attempt.
    SubmitAttempt {},
    /// Open the waiting room (teacher).
    OpenWaitingRoom {},
    /// Start the timed test (teacher).
    StartSession {},
    /// Complete the session (teacher).
    CompleteSession {},
    /// Cancel the session before start (teacher).
    CancelSession {},
    /// Liveness probe; answered with `pong` on the same connection.
    Heartbeat {},
}

impl ClientEvent {
    /// The wire `type` tag, for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AnswerSubmitted { .. } => "answer_submitted",
            Self::TabViolation { .. } => "tab_violation",
            Self::TextHighlighted { .. } => "text_highlighted",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::StateSyncRequest {} => "state_sync_request",
            Self::SubmitAttempt {} => "submit_attempt",
            Self::OpenWaitingRoom {} => "open_waiting_room",
            Self::StartSession {} => "start_session",
            Self::CompleteSession {} => "complete_session",
            Self::CancelSession {} => "cancel_session",
            Self::Heartbeat {} => "heartbeat",
        }
    }

    /// Role allowed to send this event, or `None` when any role may.
    #[must_use]
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Self::OpenWaitingRoom {}
            | Self::StartSession {}
            | Self::CompleteSession {}
            | Self::CancelSession {} => Some(Role::Teacher),
            Self::Heartbeat {} => None,
            _ => Some(Role::Student),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Wire format fixtures ────────────────────────────────────────

    #[test]
    fn wire_format_answer_submitted() {
        let raw = r#"{"type": "answer_submitted", "data": {"questionId": "q_14", "value": "B"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::AnswerSubmitted { question_id, value } => {
                assert_eq!(question_id.as_str(), "q_14");
                assert_eq!(value, json!("B"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn wire_format_answer_value_may_be_structured() {
        let raw = r#"{"type": "answer_submitted", "data": {"questionId": "q_2", "value": {"selected": ["A", "C"]}}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::AnswerSubmitted { value, .. } => {
                assert_eq!(value["selected"][1], "C");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn wire_format_tab_violation() {
        let raw = r#"{"type": "tab_violation", "data": {"kind": "TAB_SWITCH"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::TabViolation { kind } => assert_eq!(kind, ViolationKind::TabSwitch),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn wire_format_text_highlighted_full() {
        let raw = r#"{"type": "text_highlighted", "data": {
            "passageId": "psg_1", "text": "glacier", "positionStart": 120,
            "positionEnd": 127, "colorCode": "green", "comment": "evidence"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::TextHighlighted {
                passage_id,
                text,
                position_start,
                position_end,
                color_code,
                comment,
            } => {
                assert_eq!(passage_id.as_str(), "psg_1");
                assert_eq!(text, "glacier");
                assert_eq!((position_start, position_end), (120, 127));
                assert_eq!(color_code, "green");
                assert_eq!(comment.as_deref(), Some("evidence"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn text_highlighted_defaults_color_and_comment() {
        let raw = r#"{"type": "text_highlighted", "data": {
            "passageId": "psg_1", "text": "x", "positionStart": 0, "positionEnd": 1}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::TextHighlighted {
                color_code, comment, ..
            } => {
                assert_eq!(color_code, "yellow");
                assert!(comment.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn wire_format_progress_update() {
        let raw = r#"{"type": "progress_update", "data": {"passageIndex": 2, "questionIndex": 7}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::ProgressUpdate {
                passage_index,
                question_index,
            } => assert_eq!((passage_index, question_index), (2, 7)),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn wire_format_empty_payload_events() {
        for raw in [
            r#"{"type": "state_sync_request", "data": {}}"#,
            r#"{"type": "submit_attempt", "data": {}}"#,
            r#"{"type": "open_waiting_room", "data": {}}"#,
            r#"{"type": "start_session", "data": {}}"#,
            r#"{"type": "complete_session", "data": {}}"#,
            r#"{"type": "cancel_session", "data": {}}"#,
            r#"{"type": "heartbeat", "data": {}}"#,
        ] {
            let event: ClientEvent = serde_json::from_str(raw).unwrap();
            assert!(!event.event_type().is_empty(), "parsed {raw}");
        }
    }

    // ── Envelope validation ─────────────────────────────────────────

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type": "format_disk", "data": {}}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn missing_data_object_is_rejected() {
        let raw = r#"{"type": "heartbeat"}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn negative_progress_index_is_rejected() {
        let raw = r#"{"type": "progress_update", "data": {"passageIndex": -1, "questionIndex": 0}}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn missing_payload_field_is_rejected() {
        let raw = r#"{"type": "answer_submitted", "data": {"questionId": "q_1"}}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_violation_kind_is_rejected() {
        let raw = r#"{"type": "tab_violation", "data": {"kind": "TELEPATHY"}}"#;
        let result: Result<ClientEvent, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    // ── Role gating ─────────────────────────────────────────────────

    #[test]
    fn session_controls_are_teacher_only() {
        for event in [
            ClientEvent::OpenWaitingRoom {},
            ClientEvent::StartSession {},
            ClientEvent::CompleteSession {},
            ClientEvent::CancelSession {},
        ] {
            assert_eq!(event.required_role(), Some(Role::Teacher));
        }
    }

    #[test]
    fn attempt_activity_is_student_only() {
        let events = [
            ClientEvent::AnswerSubmitted {
                question_id: QuestionId::from_string("q_1"),
                value: json!("A"),
            },
            ClientEvent::TabViolation {
                kind: ViolationKind::WindowBlur,
            },
            ClientEvent::ProgressUpdate {
                passage_index: 0,
                question_index: 0,
            },
            ClientEvent::StateSyncRequest {},
            ClientEvent::SubmitAttempt {},
        ];
        for event in events {
            assert_eq!(event.required_role(), Some(Role::Student));
        }
    }

    #[test]
    fn heartbeat_is_open_to_any_role() {
        assert_eq!(ClientEvent::Heartbeat {}.required_role(), None);
    }

    // ── Serialization shape ─────────────────────────────────────────

    #[test]
    fn serializes_with_type_and_data_envelope() {
        let event = ClientEvent::ProgressUpdate {
            passage_index: 1,
            question_index: 4,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "progress_update");
        assert_eq!(v["data"]["passageIndex"], 1);
        assert_eq!(v["data"]["questionIndex"], 4);
    }

    #[test]
    fn empty_payload_serializes_as_empty_object() {
        let v = serde_json::to_value(ClientEvent::Heartbeat {}).unwrap();
        assert_eq!(v["type"], "heartbeat");
        assert_eq!(v["data"], json!({}));
    }
}
