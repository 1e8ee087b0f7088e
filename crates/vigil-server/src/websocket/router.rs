//! Inbound event dispatch.
//!
//! Every parsed client event lands here. The router enforces role gates,
//! hands the event to the matching flow, and decides what (if anything)
//! goes back on the same connection. Mutations answer with nothing on
//! success; their observable effect is the broadcast that rides the event
//! bus. Failures always answer with an `error` event so the client is
//! never left guessing.

use std::sync::Arc;

use chrono::Utc;
use tracing::{Span, debug, instrument, warn};
use vigil_core::errors::{self, DomainError};
use vigil_core::ids::{SessionId, UserId};
use vigil_core::session::Role;
use vigil_runtime::{AttemptFlows, NewHighlight, SessionFlows, StateSync};
use vigil_wire::{ClientEvent, ServerEvent};

pub struct EventRouter {
    sessions: Arc<SessionFlows>,
    attempts: Arc<AttemptFlows>,
    sync: Arc<StateSync>,
}

impl EventRouter {
    pub fn new(
        sessions: Arc<SessionFlows>,
        attempts: Arc<AttemptFlows>,
        sync: Arc<StateSync>,
    ) -> Self {
        Self {
            sessions,
            attempts,
            sync,
        }
    }

    /// Dispatch one client event. Returns the reply to send back on the
    /// connection that sent it, if any.
    #[instrument(skip(self, event), fields(session_id = %session_id, user_id = %user_id, event_type))]
    pub async fn route(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        role: Role,
        event: ClientEvent,
    ) -> Option<ServerEvent> {
        let _ = Span::current().record("event_type", event.event_type());

        if let Some(required) = event.required_role() {
            if required != role {
                debug!(%role, %required, "event rejected by role gate");
                return Some(ServerEvent::error(
                    errors::FORBIDDEN,
                    format!("{} requires the {required} role", event.event_type()),
                ));
            }
        }

        match self.dispatch(session_id, user_id, event).await {
            Ok(reply) => reply,
            Err(error) => Some(Self::error_reply(&error)),
        }
    }

    async fn dispatch(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        event: ClientEvent,
    ) -> Result<Option<ServerEvent>, DomainError> {
        match event {
            ClientEvent::Heartbeat {} => Ok(Some(ServerEvent::Pong {})),
            ClientEvent::StateSyncRequest {} => {
                let snapshot = self.sync.snapshot(session_id, user_id, Utc::now())?;
                Ok(Some(snapshot))
            }
            ClientEvent::AnswerSubmitted { question_id, value } => {
                self.attempts
                    .submit_answer(session_id, user_id, question_id, value)
                    .await?;
                Ok(None)
            }
            ClientEvent::TabViolation { kind } => {
                self.attempts
                    .record_violation(session_id, user_id, kind)
                    .await?;
                Ok(None)
            }
            ClientEvent::TextHighlighted {
                passage_id,
                text,
                position_start,
                position_end,
                color_code,
                comment,
            } => {
                let highlight = NewHighlight {
                    passage_id,
                    text,
                    position_start,
                    position_end,
                    color_code,
                    comment,
                };
                let _ = self
                    .attempts
                    .record_highlight(session_id, user_id, highlight)
                    .await?;
                Ok(None)
            }
            ClientEvent::ProgressUpdate {
                passage_index,
                question_index,
            } => {
                self.attempts
                    .update_progress(session_id, user_id, passage_index, question_index)
                    .await?;
                Ok(None)
            }
            ClientEvent::SubmitAttempt {} => {
                let _ = self.attempts.submit_attempt(session_id, user_id).await?;
                Ok(None)
            }
            ClientEvent::OpenWaitingRoom {} => {
                let _ = self.sessions.open_waiting_room(session_id).await?;
                Ok(None)
            }
            ClientEvent::StartSession {} => {
                let _ = self.sessions.start_session(session_id).await?;
                Ok(None)
            }
            ClientEvent::CompleteSession {} => {
                let _ = self.sessions.complete_session(session_id).await?;
                Ok(None)
            }
            ClientEvent::CancelSession {} => {
                let _ = self.sessions.cancel_session(session_id).await?;
                Ok(None)
            }
        }
    }

    fn error_reply(error: &DomainError) -> ServerEvent {
        if error.code() == errors::INTERNAL {
            warn!(%error, "event dispatch failed");
        } else {
            debug!(%error, code = error.code(), "event rejected");
        }
        ServerEvent::error(error.code(), error.to_string())
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter").finish_non_exhaustive()
    }
}
