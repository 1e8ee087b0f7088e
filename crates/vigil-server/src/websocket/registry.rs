//! Live connection registry.
//!
//! Tracks every open WebSocket keyed by session and user, and fans
//! outbound events out to them. One user holds at most one socket per
//! session; a second attach supersedes the first. All operations are
//! synchronous so the event bridge and handlers can call them without
//! holding locks across awaits.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};
use vigil_core::ids::{SessionId, UserId};
use vigil_core::session::Role;
use vigil_wire::ServerEvent;

use super::connection::SessionConnection;

#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, HashMap<UserId, Arc<SessionConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, superseding any existing socket for the same
    /// user in the same session. The superseded connection is closed and
    /// returned.
    pub fn register(&self, connection: Arc<SessionConnection>) -> Option<Arc<SessionConnection>> {
        let superseded = {
            let mut slot = self.sessions.entry(connection.session_id.clone()).or_default();
            slot.insert(connection.user_id.clone(), connection.clone())
        };
        if let Some(old) = &superseded {
            debug!(
                session_id = %connection.session_id,
                user_id = %connection.user_id,
                old_connection = %old.id,
                new_connection = %connection.id,
                "connection superseded"
            );
            old.close();
        }
        superseded
    }

    /// Remove a connection, but only if it is still the registered socket
    /// for its user. A superseded connection cleaning up after itself
    /// must not evict its replacement. Returns whether a removal happened.
    pub fn unregister(&self, connection: &SessionConnection) -> bool {
        if let Entry::Occupied(mut occupied) = self.sessions.entry(connection.session_id.clone()) {
            let slot = occupied.get_mut();
            let held = slot
                .get(&connection.user_id)
                .is_some_and(|current| current.id == connection.id);
            if held {
                let _ = slot.remove(&connection.user_id);
                if slot.is_empty() {
                    let _ = occupied.remove();
                }
                return true;
            }
        }
        false
    }

    /// Deliver an event to every connection in a session.
    pub fn broadcast_to_session(&self, session_id: &SessionId, event: &ServerEvent) {
        self.fanout(session_id, event, None);
    }

    /// Deliver an event to the teacher connections in a session only.
    pub fn broadcast_to_teachers(&self, session_id: &SessionId, event: &ServerEvent) {
        self.fanout(session_id, event, Some(Role::Teacher));
    }

    /// Deliver an event to one user's connection. Returns false if the
    /// user has no socket or the send failed.
    pub fn send_to_user(&self, session_id: &SessionId, user_id: &UserId, event: &ServerEvent) -> bool {
        let Some(connection) = self
            .sessions
            .get(session_id)
            .and_then(|slot| slot.get(user_id).cloned())
        else {
            return false;
        };
        if connection.send_event(event) {
            true
        } else {
            warn!(
                connection_id = %connection.id,
                user_id = %user_id,
                "direct send failed; dropping connection"
            );
            self.drop_failed(&connection);
            false
        }
    }

    fn fanout(&self, session_id: &SessionId, event: &ServerEvent, role: Option<Role>) {
        let json = match serde_json::to_string(event) {
            Ok(json) => Arc::new(json),
            Err(error) => {
                warn!(error = %error, "failed to serialize broadcast event");
                return;
            }
        };
        // Snapshot recipients so the shard lock is released before sending.
        let recipients: Vec<Arc<SessionConnection>> = {
            let Some(slot) = self.sessions.get(session_id) else {
                return;
            };
            slot.values()
                .filter(|connection| role.is_none_or(|wanted| connection.role == wanted))
                .cloned()
                .collect()
        };
        debug!(
            session_id = %session_id,
            event_type = event.event_type(),
            recipients = recipients.len(),
            "broadcasting"
        );
        for connection in recipients {
            if !connection.send(json.clone()) {
                warn!(
                    connection_id = %connection.id,
                    user_id = %connection.user_id,
                    "send queue full; dropping connection"
                );
                self.drop_failed(&connection);
            }
        }
    }

    fn drop_failed(&self, connection: &SessionConnection) {
        connection.close();
        let _ = self.unregister(connection);
    }

    pub fn is_connected(&self, session_id: &SessionId, user_id: &UserId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|slot| slot.contains_key(user_id))
    }

    /// User ids with a live socket in the session.
    pub fn connected_users(&self, session_id: &SessionId) -> Vec<UserId> {
        self.sessions
            .get(session_id)
            .map(|slot| slot.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total live connections across all sessions.
    pub fn connection_count(&self) -> usize {
        self.sessions.iter().map(|slot| slot.len()).sum()
    }

    /// Sessions with at least one live connection.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every connection. Each session task then runs its own
    /// cleanup, so entries disappear as the tasks exit.
    pub fn drain(&self) {
        let mut closed = 0usize;
        for slot in self.sessions.iter() {
            for connection in slot.values() {
                connection.close();
                closed += 1;
            }
        }
        debug!(connections = closed, "connection registry drained");
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("sessions", &self.session_count())
            .field("connections", &self.connection_count())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
