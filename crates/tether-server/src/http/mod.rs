//! HTTP surface
//!
//! `/agent/...` is polled by remote agents; `/api/...` is used by
//! operators. Neither performs authentication.

mod agent;
mod operator;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tether_core::api::ErrorBody;
use tether_core::{DispatchError, ExchangeError, SessionId};

use crate::state::ServerState;

/// Build the full router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .nest("/agent", agent::routes())
        .nest("/api", operator::routes())
        .with_state(state)
}

/// Serve HTTP on `listener` until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("Failed to read listener address")?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server failed")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Errors rendered as JSON API responses
#[derive(Error, Debug)]
pub enum ApiError {
    /// Outcome of a dispatched command
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Rejected agent write
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Agent request for a session that is not registered
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Dispatch(e) => {
                let status = match e {
                    DispatchError::UnknownSession(_) => StatusCode::NOT_FOUND,
                    DispatchError::CommandInFlight(_) => StatusCode::CONFLICT,
                    DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    DispatchError::AgentError(_) => StatusCode::BAD_GATEWAY,
                    DispatchError::SessionLost(_) => StatusCode::GONE,
                    DispatchError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                    DispatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind())
            }
            ApiError::Exchange(ExchangeError::NotPending(_)) => {
                (StatusCode::NOT_FOUND, "not_pending")
            }
            ApiError::Exchange(ExchangeError::AlreadyCompleted(_)) => {
                (StatusCode::CONFLICT, "already_completed")
            }
            ApiError::Exchange(ExchangeError::AlreadyPending(_)) => {
                (StatusCode::CONFLICT, "already_pending")
            }
            ApiError::UnknownSession(_) => (StatusCode::NOT_FOUND, "unknown_session"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let error = match &self {
            // The agent's own failure detail goes to the operator verbatim
            ApiError::Dispatch(DispatchError::AgentError(output)) => {
                String::from_utf8_lossy(output).into_owned()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                kind: kind.to_string(),
                error,
            }),
        )
            .into_response()
    }
}
