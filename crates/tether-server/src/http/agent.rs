//! Agent-facing routes
//!
//! Agents connect, poll for their pending command, post the result and
//! disconnect. Every poll counts as a heartbeat for the liveness sweeper.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;

use tether_core::api::{CommandResult, PendingCommand, SessionInfo};
use tether_core::{AgentInfo, ExchangeError, SessionId};

use super::ApiError;
use crate::state::ServerState;

pub(super) fn routes() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/:session_id/connect", post(connect))
        .route("/:session_id/command", get(poll_command))
        .route("/:session_id/result", post(post_result))
        .route("/:session_id/disconnect", post(disconnect))
}

async fn connect(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    Json(info): Json<AgentInfo>,
) -> Json<SessionInfo> {
    let handle = state.registry.register(SessionId::new(session_id), info);
    Json(handle.session_info())
}

async fn poll_command(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = SessionId::new(session_id);
    if !state.registry.touch(&session_id) {
        return Err(ApiError::UnknownSession(session_id));
    }

    match state.store.get(&session_id).await {
        Some(exchange) if exchange.is_pending() => Ok(Json(PendingCommand {
            exchange_id: exchange.id,
            request: exchange.request,
        })
        .into_response()),
        _ => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn post_result(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    Json(result): Json<CommandResult>,
) -> Result<StatusCode, ApiError> {
    let session_id = SessionId::new(session_id);
    state.registry.touch(&session_id);

    let outcome = state
        .store
        .complete(
            &session_id,
            result.exchange_id,
            Bytes::from(result.response),
            result.has_error,
        )
        .await;

    match outcome {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(ExchangeError::NotPending(_)) => {
            // The issuer already gave up; nobody is waiting for this result
            tracing::debug!(
                "Discarding late result for {} on {}",
                result.exchange_id,
                session_id
            );
            Err(ExchangeError::NotPending(session_id).into())
        }
        Err(e) => {
            tracing::warn!("Rejected result from {}: {}", session_id, e);
            Err(e.into())
        }
    }
}

async fn disconnect(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.registry.unregister(&SessionId::new(session_id)).await;
    StatusCode::NO_CONTENT
}
