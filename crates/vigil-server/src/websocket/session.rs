//! WebSocket attach and per-connection session loop.
//!
//! `GET /sessions/{id}/ws?token=...` lands here. The token rides a query
//! parameter because browser WebSocket clients cannot set headers on the
//! handshake. Authentication and access checks happen before the session
//! loop starts; failures still upgrade, then close immediately with a
//! policy-violation frame so the client sees why.
//!
//! Each accepted socket runs three tasks: this read loop, an outbound
//! writer that also pings on the heartbeat interval, and a liveness
//! watcher. All of them stop when the connection token cancels, and
//! teardown runs once, at the end of the read loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use vigil_core::errors;
use vigil_core::ids::SessionId;
use vigil_core::session::Role;
use vigil_wire::{ClientEvent, ServerEvent, wire_timestamp};

use crate::auth::Identity;
use crate::server::AppState;

use super::connection::SessionConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};

/// Close code sent when an attach is refused.
const POLICY_VIOLATION: u16 = 1008;

/// Outbound queue depth per connection.
const SEND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    token: String,
}

/// Handle the WebSocket attach route.
pub async fn attach_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<AttachQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = SessionId::from_string(session_id);
    let upgrade = ws.max_message_size(state.config.max_message_size);

    let identity = match state.verifier.verify(&query.token) {
        Ok(identity) => identity,
        Err(error) => {
            debug!(session_id = %session_id, error = %error, "websocket auth failed");
            return upgrade.on_upgrade(move |socket| refuse(socket, "invalid token".to_string()));
        }
    };

    if let Err(reason) = attach_allowed(&state, &session_id, &identity) {
        debug!(
            session_id = %session_id,
            user_id = %identity.user_id,
            reason = %reason,
            "websocket attach refused"
        );
        return upgrade.on_upgrade(move |socket| refuse(socket, reason));
    }

    upgrade.on_upgrade(move |socket| run_ws_session(socket, state, session_id, identity))
}

/// Check that the caller may attach to the session at all.
///
/// Teachers may watch any existing session. Students must be on the
/// roster. Lifecycle timing is not checked here: joining a session that
/// is not accepting students yet fails inside the join flow without
/// costing the client its socket.
fn attach_allowed(state: &AppState, session_id: &SessionId, identity: &Identity) -> Result<(), String> {
    let session = match state.sessions.get_session(session_id) {
        Ok(session) => session,
        Err(error) => return Err(error.to_string()),
    };
    if identity.role == Role::Student && !session.is_in_roster(&identity.user_id) {
        return Err(format!("{} is not on the session roster", identity.user_id));
    }
    Ok(())
}

/// Complete the upgrade, then close with a policy-violation frame.
async fn refuse(mut socket: WebSocket, reason: String) {
    let frame = CloseFrame {
        code: POLICY_VIOLATION,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

#[instrument(skip_all, fields(session_id = %session_id, user_id = %identity.user_id, role = %identity.role))]
async fn run_ws_session(socket: WebSocket, state: AppState, session_id: SessionId, identity: Identity) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(SEND_QUEUE_CAPACITY);

    let connection = Arc::new(SessionConnection::new(
        session_id.clone(),
        identity.user_id.clone(),
        identity.role,
        send_tx,
    ));
    info!(connection_id = %connection.id, "client attached");

    let _ = state.registry.register(connection.clone());

    // Greeting goes on the queue before the join flow publishes anything,
    // so `connected` is always the first event on this socket.
    let greeting = ServerEvent::Connected {
        session_id: session_id.clone(),
        user_id: identity.user_id.clone(),
        timestamp: wire_timestamp(Utc::now()),
    };
    if !connection.send_event(&greeting) {
        warn!(connection_id = %connection.id, "greeting enqueue failed");
    }

    if identity.role == Role::Student {
        if let Err(error) = state.sessions.student_join(&session_id, &identity.user_id).await {
            warn!(error = %error, "join on attach failed; connection stays open");
        }
    }

    // Outbound writer. Forwards queued events and pings on the heartbeat
    // interval; a closed connection token makes it send the close frame.
    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let writer_conn = connection.clone();
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                queued = send_rx.recv() => {
                    let Some(text) = queued else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_conn.closed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Liveness watcher. A timeout closes the connection token, which the
    // read loop below observes.
    let watcher_conn = connection.clone();
    let heartbeat_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let heartbeat_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let heartbeat = tokio::spawn(async move {
        let result = run_heartbeat(watcher_conn.clone(), heartbeat_interval, heartbeat_timeout).await;
        if result == HeartbeatResult::TimedOut {
            warn!(connection_id = %watcher_conn.id, "heartbeat timed out; closing connection");
            watcher_conn.close();
        }
    });

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(error)) => {
                        debug!(error = %error, "websocket read error");
                        break;
                    }
                    None => break,
                };
                match message {
                    Message::Text(text) => {
                        connection.mark_alive();
                        handle_text(&state, &connection, text.as_str()).await;
                    }
                    Message::Binary(data) => {
                        connection.mark_alive();
                        match std::str::from_utf8(&data) {
                            Ok(text) => handle_text(&state, &connection, text).await,
                            Err(_) => debug!(bytes = data.len(), "ignoring non-UTF8 binary frame"),
                        }
                    }
                    Message::Ping(_) | Message::Pong(_) => connection.mark_alive(),
                    Message::Close(_) => break,
                }
            }
            () = connection.closed() => break,
        }
    }

    // Teardown. `unregister` is identity-checked: a superseded connection
    // returns false here and must not mark the live successor offline.
    let removed = state.registry.unregister(&connection);
    heartbeat.abort();
    outbound.abort();
    if removed && identity.role == Role::Student {
        if let Err(error) = state
            .sessions
            .student_disconnect(&session_id, &identity.user_id)
            .await
        {
            warn!(error = %error, "disconnect cleanup failed");
        }
    }
    info!(
        connection_id = %connection.id,
        dropped = connection.drop_count(),
        "client detached"
    );
}

/// Parse and route one text frame. Parse failures answer with an error
/// event and never cost the client its connection.
async fn handle_text(state: &AppState, connection: &Arc<SessionConnection>, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(error) => {
            debug!(error = %error, "unparseable client event");
            let _ = connection.send_event(&ServerEvent::error(
                errors::INVALID_PAYLOAD,
                format!("unrecognized event: {error}"),
            ));
            return;
        }
    };

    let reply = state
        .router
        .route(&connection.session_id, &connection.user_id, connection.role, event)
        .await;
    if let Some(reply) = reply {
        if !connection.send_event(&reply) {
            debug!(event_type = reply.event_type(), "reply dropped; send queue full");
        }
    }
}
