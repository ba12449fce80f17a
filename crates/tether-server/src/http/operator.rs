//! Operator-facing routes

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use tether_core::api::{CommandOutput, ExecuteCommand, ServerStatus, SessionInfo};
use tether_core::SessionId;

use super::ApiError;
use crate::state::ServerState;

pub(super) fn routes() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/status", get(status))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:session_id/commands", post(execute_command))
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<ServerStatus> {
    Json(ServerStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        session_count: state.registry.len(),
        pending_count: state.store.pending_count(),
    })
}

async fn list_sessions(State(state): State<Arc<ServerState>>) -> Json<Vec<SessionInfo>> {
    let mut sessions: Vec<SessionInfo> = state
        .registry
        .list()
        .iter()
        .map(|handle| handle.session_info())
        .collect();
    sessions.sort_by(|a, b| a.session_id.as_str().cmp(b.session_id.as_str()));
    Json(sessions)
}

async fn execute_command(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    Json(request): Json<ExecuteCommand>,
) -> Result<Json<CommandOutput>, ApiError> {
    let session_id = SessionId::new(session_id);
    let timeout = state.config.effective_timeout(request.timeout);

    tracing::debug!("Operator command for {}: {}", session_id, request.command);
    let response = state
        .dispatch
        .execute(&session_id, request.command, timeout)
        .await?;

    Ok(Json(CommandOutput {
        response: String::from_utf8_lossy(&response).into_owned(),
    }))
}
