//! Health check endpoint payload.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Response body for `GET /health`.
///
/// `active_sessions` counts sessions with at least one live socket, which
/// is the number that matters for a real-time tier. Sessions idling in the
/// store without connections do not appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub connections: usize,
    pub active_sessions: usize,
}

pub fn health_check(
    start_time: Instant,
    connections: usize,
    active_sessions: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        active_sessions,
    }
}
