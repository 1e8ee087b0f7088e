//! Server wiring: shared state, HTTP routes, and the listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use vigil_core::errors::{self, DomainError};
use vigil_core::ids::{ClassId, SessionId, TestId, UserId};
use vigil_core::session::{Role, Session, SessionStatus};
use vigil_runtime::{AttemptFlows, NewSession, SessionFilter, SessionFlows, StateSync};

use crate::auth::{Identity, TokenVerifier};
use crate::config::ServerConfig;
use crate::health::{HealthResponse, health_check};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::event_bridge::EventBridge;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::router::EventRouter;
use crate::websocket::session::attach_handler;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionFlows>,
    pub router: Arc<EventRouter>,
    pub registry: Arc<ConnectionRegistry>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub config: ServerConfig,
    pub start_time: Instant,
}

/// The HTTP + WebSocket server.
///
/// Owns the connection registry and shutdown coordinator; the flows are
/// shared with whoever else needs them (the event bridge, background
/// timers).
pub struct VigilServer {
    state: AppState,
}

impl VigilServer {
    pub fn new(
        config: ServerConfig,
        sessions: Arc<SessionFlows>,
        attempts: Arc<AttemptFlows>,
        sync: Arc<StateSync>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let router = Arc::new(EventRouter::new(sessions.clone(), attempts, sync));
        Self {
            state: AppState {
                sessions,
                router,
                registry: Arc::new(ConnectionRegistry::new()),
                verifier,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                config,
                start_time: Instant::now(),
            },
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/sessions", post(create_session_handler).get(list_sessions_handler))
            .route("/sessions/{id}", get(get_session_handler))
            .route("/sessions/{id}/ws", get(attach_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and start serving. Returns the bound address and the server
    /// task; the task ends when the shutdown token cancels.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind((
            self.state.config.host.as_str(),
            self.state.config.port,
        ))
        .await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(error) = served {
                error!(error = %error, "server task failed");
            }
        });
        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Spawn the bridge that forwards bus events to live sockets.
    pub fn spawn_event_bridge(
        &self,
        rx: tokio::sync::broadcast::Receiver<vigil_runtime::OutboundEvent>,
    ) -> JoinHandle<()> {
        let bridge = EventBridge::new(rx, self.state.registry.clone());
        tokio::spawn(bridge.run())
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.state.registry.clone()
    }

    pub fn shutdown(&self) -> Arc<ShutdownCoordinator> {
        self.state.shutdown.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request/response error with a wire-style code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: errors::FORBIDDEN,
            message: message.into(),
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: errors::FORBIDDEN,
            message: message.into(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        let status = match error.code() {
            errors::NOT_FOUND => StatusCode::NOT_FOUND,
            errors::INVALID_PAYLOAD => StatusCode::BAD_REQUEST,
            errors::FORBIDDEN => StatusCode::FORBIDDEN,
            errors::STATE_ERROR | errors::CONFLICT => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %error, "request failed");
        }
        Self {
            status,
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "code": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Pull and verify the bearer token from the `Authorization` header.
fn bearer_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("malformed authorization header"))?;
    state
        .verifier
        .verify(token)
        .map_err(|error| ApiError::unauthorized(error.to_string()))
}

#[allow(clippy::unused_async)]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.session_count(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    class_id: String,
    test_id: String,
    title: String,
    duration_seconds: i64,
    scheduled_at: DateTime<Utc>,
    roster: Vec<String>,
}

#[allow(clippy::unused_async)]
async fn create_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = bearer_identity(&state, &headers)?;
    if identity.role != Role::Teacher {
        return Err(ApiError::forbidden("session creation requires the teacher role"));
    }
    let session = state.sessions.create_session(NewSession {
        class_id: ClassId::from_string(body.class_id),
        test_id: TestId::from_string(body.test_id),
        title: body.title,
        duration_seconds: body.duration_seconds,
        scheduled_at: body.scheduled_at,
        roster: body.roster.into_iter().map(UserId::from_string).collect(),
        created_by: identity.user_id,
    })?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsQuery {
    class_id: Option<String>,
    status: Option<SessionStatus>,
    limit: Option<i64>,
}

#[allow(clippy::unused_async)]
async fn list_sessions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let _ = bearer_identity(&state, &headers)?;
    let filter = SessionFilter {
        class_id: query.class_id.map(ClassId::from_string),
        status: query.status,
        limit: query.limit,
    };
    Ok(Json(state.sessions.list_sessions(&filter)?))
}

#[allow(clippy::unused_async)]
async fn get_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let _ = bearer_identity(&state, &headers)?;
    let session = state.sessions.get_session(&SessionId::from_string(session_id))?;
    Ok(Json(session))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
