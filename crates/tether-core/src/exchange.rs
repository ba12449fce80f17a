//! Exchange: one command and its eventual result for one session
//!
//! An exchange moves through `Pending -> {Completed | Expired | Aborted}`
//! exactly once. The store delivers the terminal outcome to the issuer
//! through a [`PendingExchange`], which wraps a oneshot receiver owned by
//! that single exchange.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

use crate::types::SessionId;

/// Generation number identifying one exchange instance.
///
/// Successive exchanges on the same session get distinct IDs, which is
/// what lets the store reject a late write aimed at an expired exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(pub u64);

impl ExchangeId {
    /// Get the raw generation value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange-{}", self.0)
    }
}

/// Snapshot of an exchange as held by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Target session
    pub session_id: SessionId,
    /// Instance identifier
    pub id: ExchangeId,
    /// Command payload, set once at creation
    pub request: String,
    /// Result payload, absent until the agent completes the command
    pub response: Option<Bytes>,
    /// True once a response has been recorded
    pub has_response: bool,
    /// True if the agent reported failure executing the command
    pub has_error: bool,
    /// Creation time (unix millis)
    pub created_at: u64,
}

impl Exchange {
    /// Create a new pending exchange
    pub fn new(session_id: SessionId, id: ExchangeId, request: String, created_at: u64) -> Self {
        Self {
            session_id,
            id,
            request,
            response: None,
            has_response: false,
            has_error: false,
            created_at,
        }
    }

    /// Whether the exchange still awaits an agent response
    pub fn is_pending(&self) -> bool {
        !self.has_response
    }
}

/// Why an exchange was resolved without an agent response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The owning session was unregistered
    SessionLost,
    /// The server drained its store during shutdown
    ShuttingDown,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::SessionLost => write!(f, "session lost"),
            AbortReason::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Terminal outcome delivered to the issuer of an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The agent posted a result
    Completed { response: Bytes, has_error: bool },
    /// The exchange was torn down before the agent answered
    Aborted(AbortReason),
}

/// Issuer-side handle returned by `ExchangeStore::set`.
///
/// Awaiting [`PendingExchange::resolved`] suspends without polling until
/// the store resolves this exchange. Dropping the handle is harmless: the
/// store's later send simply fails.
#[derive(Debug)]
pub struct PendingExchange {
    /// Session the exchange belongs to
    pub session_id: SessionId,
    /// Instance identifier
    pub id: ExchangeId,
    rx: oneshot::Receiver<Resolution>,
}

impl PendingExchange {
    /// Create a handle around the receiving half of an exchange's channel
    pub fn new(session_id: SessionId, id: ExchangeId, rx: oneshot::Receiver<Resolution>) -> Self {
        Self { session_id, id, rx }
    }

    /// Wait for the terminal outcome.
    ///
    /// Returns `None` if the store dropped the exchange without resolving
    /// it, which only an unconditional `remove` does.
    pub async fn resolved(&mut self) -> Option<Resolution> {
        (&mut self.rx).await.ok()
    }

    /// Non-blocking check for an outcome already delivered
    pub fn try_resolved(&mut self) -> Option<Resolution> {
        self.rx.try_recv().ok()
    }
}
