//! Correlation store trait

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ExchangeError;
use crate::exchange::{AbortReason, Exchange, ExchangeId, PendingExchange};
use crate::types::SessionId;

/// Rendezvous point between a command issuer and the responding agent.
///
/// Holds at most one exchange per session. The issuer side (`set`, `take`)
/// and the agent side (`get`, `complete`) only ever touch an exchange
/// through these operations.
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Install a new pending exchange for `session_id`.
    ///
    /// Fails with [`ExchangeError::AlreadyPending`] if any exchange is
    /// still stored for the key.
    async fn set(
        &self,
        session_id: &SessionId,
        request: String,
    ) -> Result<PendingExchange, ExchangeError>;

    /// Snapshot the current exchange for `session_id` without removing it
    async fn get(&self, session_id: &SessionId) -> Option<Exchange>;

    /// Record the agent's result for a specific exchange instance and wake
    /// its issuer.
    ///
    /// Fails with [`ExchangeError::NotPending`] if the key is empty or
    /// holds a different exchange, and with
    /// [`ExchangeError::AlreadyCompleted`] on a second write.
    async fn complete(
        &self,
        session_id: &SessionId,
        exchange_id: ExchangeId,
        response: Bytes,
        has_error: bool,
    ) -> Result<(), ExchangeError>;

    /// Remove the entry for `session_id` unconditionally
    async fn remove(&self, session_id: &SessionId) -> Option<Exchange>;

    /// Remove the entry only if it is still `exchange_id`
    async fn take(&self, session_id: &SessionId, exchange_id: ExchangeId) -> Option<Exchange>;

    /// Remove the entry and resolve its issuer with `reason`.
    ///
    /// Returns true if an exchange was stored for the key.
    async fn abort(&self, session_id: &SessionId, reason: AbortReason) -> bool;

    /// Like [`abort`](Self::abort), but only if the entry is still
    /// `exchange_id`. A newer exchange on the same key is left alone.
    async fn abort_if(
        &self,
        session_id: &SessionId,
        exchange_id: ExchangeId,
        reason: AbortReason,
    ) -> bool;

    /// Abort every stored exchange, returning how many were resolved
    async fn drain(&self, reason: AbortReason) -> usize;

    /// Number of stored exchanges
    fn pending_count(&self) -> usize;
}
