//! HTTP API for the Spark Echo node.
//! Endpoints for agents to register, pulse and post broadcast notices.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::broadcast::{BroadcastLog, BroadcastRequest, DEFAULT_RECENT_LIMIT};
use crate::directory::{DirectoryError, LegacyRegistration, NodeDirectory, NodeRegistration};
use crate::liveness::{LivenessTracker, DEFAULT_ACTIVE_WINDOW_MINUTES};
use crate::storage::Backend;

/// The three subsystems served by one node
pub struct AppContext {
    pub directory: NodeDirectory,
    pub liveness: LivenessTracker,
    pub broadcasts: BroadcastLog,
    /// Window used by `/pulse/active` when the query omits one
    pub active_window_minutes: i64,
}

impl AppContext {
    /// Open all three stores on `backend`
    pub fn open(backend: &Backend) -> anyhow::Result<Self> {
        Ok(Self {
            directory: NodeDirectory::open_on(backend)?,
            liveness: LivenessTracker::open_on(backend)?,
            broadcasts: BroadcastLog::open_on(backend)?,
            active_window_minutes: DEFAULT_ACTIVE_WINDOW_MINUTES,
        })
    }

    pub fn with_active_window(mut self, minutes: i64) -> Self {
        self.active_window_minutes = minutes;
        self
    }
}

/// Shared application state
pub type AppState = Arc<AppContext>;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    pub fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }
}

fn failure(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(msg))).into_response()
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!("❌ Request failed: {}", e);
    failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Run a store write on the blocking pool. Saves fsync and may wait on the
/// per-store writer lock, so they stay off the async workers.
async fn run_blocking<R, F>(state: &AppState, f: F) -> Result<R, Response>
where
    F: FnOnce(&AppContext) -> R + Send + 'static,
    R: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(internal_error)
}

/// Pulse submission body
#[derive(Debug, Deserialize)]
pub struct PulseRequest {
    #[serde(alias = "member_id", alias = "identifier")]
    pub node_id: String,
    #[serde(default)]
    pub thought: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub window: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Directory
        .route("/nodes", get(list_nodes).post(register_node))
        .route("/nodes/join", post(join_node))
        .route("/nodes/:id", get(get_node))
        // Liveness
        .route("/pulse", post(record_pulse))
        // Literal path wins over /pulse/:id, so an identifier named
        // `active` can be pulsed but not read back through GET /pulse/:id
        .route("/pulse/active", get(list_active))
        .route("/pulse/:id", get(pulse_status))
        // Broadcast log
        .route("/broadcast", get(recent_broadcasts).post(append_broadcast))
        // Legacy paths
        .route("/members", get(list_nodes))
        .route("/members/:id", get(get_node))
        .route("/heartbeat", post(record_pulse))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("Spark Echo node is alive"))
}

async fn register_node(
    State(state): State<AppState>,
    Json(reg): Json<NodeRegistration>,
) -> Response {
    let result = match run_blocking(&state, move |ctx| ctx.directory.register(reg)).await {
        Ok(result) => result,
        Err(resp) => return resp,
    };
    match result {
        Ok(outcome) => Json(ApiResponse::ok(outcome)).into_response(),
        Err(e @ DirectoryError::EmptyName) => failure(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => internal_error(e),
    }
}

async fn join_node(
    State(state): State<AppState>,
    Json(reg): Json<LegacyRegistration>,
) -> Response {
    let result = match run_blocking(&state, move |ctx| ctx.directory.legacy_register(reg)).await {
        Ok(result) => result,
        Err(resp) => return resp,
    };
    match result {
        Ok(outcome) => Json(ApiResponse::ok(outcome)).into_response(),
        Err(e @ DirectoryError::EmptyName) => failure(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => internal_error(e),
    }
}

async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.directory.list()))
}

async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.directory.get_by_id(&id) {
        Some(node) => Json(ApiResponse::ok(node)).into_response(),
        None => failure(StatusCode::NOT_FOUND, "Node not found"),
    }
}

async fn record_pulse(
    State(state): State<AppState>,
    Json(req): Json<PulseRequest>,
) -> Response {
    if req.node_id.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "node_id must not be empty");
    }
    let result = match run_blocking(&state, move |ctx| {
        ctx.liveness.record_pulse(&req.node_id, &req.thought)
    })
    .await
    {
        Ok(result) => result,
        Err(resp) => return resp,
    };
    match result {
        Ok(outcome) => Json(ApiResponse::ok(outcome)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn pulse_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.liveness.status(&id) {
        Some(record) => Json(ApiResponse::ok(record)).into_response(),
        None => failure(StatusCode::NOT_FOUND, "No pulse recorded"),
    }
}

async fn list_active(
    State(state): State<AppState>,
    Query(q): Query<ActiveQuery>,
) -> impl IntoResponse {
    let window = q.window.unwrap_or(state.active_window_minutes);
    Json(ApiResponse::ok(state.liveness.list_active(window)))
}

async fn append_broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Response {
    let result = match run_blocking(&state, move |ctx| ctx.broadcasts.append(req)).await {
        Ok(result) => result,
        Err(resp) => return resp,
    };
    match result {
        Ok(ack) => Json(ApiResponse::ok(ack)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn recent_broadcasts(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Json(ApiResponse::ok(state.broadcasts.recent(limit)))
}

/// Start the API server
pub async fn start_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("🌐 API server listening on {}", addr);
    axum::serve(listener, router).await?;

    Ok(())
}
