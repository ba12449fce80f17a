//! Dispatch service
//!
//! The synchronous-looking facade used by operator-facing handlers: issue a
//! command to one session and wait for the agent's answer. Each exchange
//! ends exactly once as completed, expired or aborted, and is removed from
//! the store on every path, including when the caller's future is dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use tether_core::exchange::PendingExchange;
use tether_core::traits::ExchangeStore;
use tether_core::{
    AbortReason, DispatchError, ExchangeError, ExchangeId, Resolution, SessionId,
};

use crate::session::SessionRegistry;

/// Issues commands to agent sessions and waits for their results
pub struct DispatchService {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn ExchangeStore>,
    /// Fired once the server starts shutting down
    shutdown: CancellationToken,
}

impl DispatchService {
    /// Create a dispatcher over an explicitly constructed registry and store.
    ///
    /// Once `shutdown` fires, new commands are refused and waiting ones
    /// fail with [`DispatchError::ShuttingDown`].
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn ExchangeStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            store,
            shutdown,
        }
    }

    /// Run `command` on `session_id`, waiting up to `timeout` for the result.
    ///
    /// At most one command may be in flight per session; a second call
    /// fails with [`DispatchError::CommandInFlight`] instead of queueing.
    pub async fn execute(
        &self,
        session_id: &SessionId,
        command: impl Into<String>,
        timeout: Duration,
    ) -> Result<Bytes, DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }
        let Some(session) = self.registry.connected(session_id) else {
            return Err(DispatchError::UnknownSession(session_id.clone()));
        };

        let mut pending = match self.store.set(session_id, command.into()).await {
            Ok(pending) => pending,
            Err(ExchangeError::AlreadyPending(id)) => {
                return Err(DispatchError::CommandInFlight(id));
            }
            Err(e) => return Err(e.into()),
        };
        let guard = ExchangeGuard::new(Arc::clone(&self.store), &pending);
        session.bind_exchange(pending.id);

        tracing::debug!(
            "Dispatched {} to {} (timeout: {:?})",
            pending.id,
            session_id,
            timeout
        );

        // Teardown or shutdown may have slipped in between the checks above
        // and `set`; teardown only aborts what it saw bound to `session`
        if !session.is_connected() {
            let lost = DispatchError::SessionLost(session_id.clone());
            let result = self.settle(session_id, &mut pending, lost).await;
            self.finish(guard).await;
            return result;
        }
        if self.shutdown.is_cancelled() {
            let result = self
                .settle(session_id, &mut pending, DispatchError::ShuttingDown)
                .await;
            self.finish(guard).await;
            return result;
        }

        let result = tokio::select! {
            waited = tokio::time::timeout(timeout, pending.resolved()) => match waited {
                Ok(Some(resolution)) => into_result(session_id, resolution),
                // Removed without resolution by an unconditional `remove`
                Ok(None) => Err(DispatchError::SessionLost(session_id.clone())),
                Err(_) => {
                    self.settle(session_id, &mut pending, DispatchError::Timeout(timeout))
                        .await
                }
            },
            _ = self.shutdown.cancelled() => {
                self.settle(session_id, &mut pending, DispatchError::ShuttingDown)
                    .await
            }
        };

        self.finish(guard).await;

        match &result {
            Ok(response) => tracing::debug!(
                "Command on {} completed ({} bytes)",
                session_id,
                response.len()
            ),
            Err(DispatchError::Timeout(_)) => {
                tracing::debug!("Command on {} timed out after {:?}", session_id, timeout)
            }
            Err(e) => tracing::debug!("Command on {} failed: {}", session_id, e),
        }
        result
    }

    /// Resolve an exchange the issuer stops waiting for, failing with
    /// `fallback` unless an outcome already landed.
    ///
    /// Removing the entry and reading it back happen in one store call, so
    /// an agent write racing the give-up either lands before it (and wins)
    /// or finds the key gone and gets `NotPending`.
    async fn settle(
        &self,
        session_id: &SessionId,
        pending: &mut PendingExchange,
        fallback: DispatchError,
    ) -> Result<Bytes, DispatchError> {
        match self.store.take(session_id, pending.id).await {
            Some(exchange) if exchange.has_response => {
                let response = exchange.response.unwrap_or_default();
                if exchange.has_error {
                    Err(DispatchError::AgentError(response))
                } else {
                    Ok(response)
                }
            }
            Some(_) => Err(fallback),
            // Already gone: an abort or completion delivered just now
            None => match pending.try_resolved() {
                Some(resolution) => into_result(session_id, resolution),
                None => Err(fallback),
            },
        }
    }

    async fn finish(&self, mut guard: ExchangeGuard) {
        guard.disarm();
        self.store.take(&guard.session_id, guard.exchange_id).await;
    }
}

fn into_result(session_id: &SessionId, resolution: Resolution) -> Result<Bytes, DispatchError> {
    match resolution {
        Resolution::Completed {
            response,
            has_error: false,
        } => Ok(response),
        Resolution::Completed {
            response,
            has_error: true,
        } => Err(DispatchError::AgentError(response)),
        Resolution::Aborted(AbortReason::SessionLost) => {
            Err(DispatchError::SessionLost(session_id.clone()))
        }
        Resolution::Aborted(AbortReason::ShuttingDown) => Err(DispatchError::ShuttingDown),
    }
}

/// Removes the exchange if `execute` is dropped before finishing, e.g.
/// when the operator's HTTP request is cancelled mid-wait.
struct ExchangeGuard {
    store: Arc<dyn ExchangeStore>,
    session_id: SessionId,
    exchange_id: ExchangeId,
    armed: bool,
}

impl ExchangeGuard {
    fn new(store: Arc<dyn ExchangeStore>, pending: &PendingExchange) -> Self {
        Self {
            store,
            session_id: pending.session_id.clone(),
            exchange_id: pending.id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "Cannot release {} for {}: no runtime",
                self.exchange_id,
                self.session_id
            );
            return;
        };

        let store = Arc::clone(&self.store);
        let session_id = self.session_id.clone();
        let exchange_id = self.exchange_id;
        tracing::debug!("Releasing abandoned {} for {}", exchange_id, session_id);
        runtime.spawn(async move {
            store.take(&session_id, exchange_id).await;
        });
    }
}
