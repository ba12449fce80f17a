//! Core error types for Tether

use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::SessionId;

/// Top-level error type for the Tether ecosystem
#[derive(Error, Debug)]
pub enum TetherError {
    /// Correlation store error
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by correlation store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// An unresolved exchange already exists for the session
    #[error("An exchange is already pending for {0}")]
    AlreadyPending(SessionId),

    /// No exchange is outstanding for the session, or the write targets
    /// an exchange that has since been replaced or removed
    #[error("No exchange pending for {0}")]
    NotPending(SessionId),

    /// The exchange already holds a response
    #[error("Exchange for {0} already completed")]
    AlreadyCompleted(SessionId),
}

/// Errors returned to the caller of `DispatchService::execute`.
///
/// `Timeout` and `SessionLost` are ordinary outcomes of talking to a
/// remote agent, not faults of the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The target session is not registered or not connected
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// A command is already outstanding for the session
    #[error("A command is already in flight for {0}")]
    CommandInFlight(SessionId),

    /// The agent did not answer within the allotted time
    #[error("Timed out after {0:?} waiting for agent response")]
    Timeout(Duration),

    /// The agent executed the command and reported a failure
    #[error("Agent reported an error: {}", String::from_utf8_lossy(.0))]
    AgentError(Bytes),

    /// The session was torn down while the command was pending
    #[error("Session lost: {0}")]
    SessionLost(SessionId),

    /// The server is shutting down and drained all pending exchanges
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Unexpected store failure
    #[error("Store error: {0}")]
    Store(#[from] ExchangeError),
}

impl DispatchError {
    /// Stable machine-readable name for API responses
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownSession(_) => "unknown_session",
            DispatchError::CommandInFlight(_) => "command_in_flight",
            DispatchError::Timeout(_) => "timeout",
            DispatchError::AgentError(_) => "agent_error",
            DispatchError::SessionLost(_) => "session_lost",
            DispatchError::ShuttingDown => "shutting_down",
            DispatchError::Store(_) => "store",
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_displays_output_verbatim() {
        let err = DispatchError::AgentError(Bytes::from_static(b"permission denied"));
        assert_eq!(err.to_string(), "Agent reported an error: permission denied");
    }

    #[test]
    fn test_store_error_converts_into_dispatch() {
        let err: DispatchError = ExchangeError::NotPending(SessionId::new("dev-1")).into();
        assert_eq!(err.kind(), "store");
    }

    #[test]
    fn test_dispatch_error_kinds_are_distinct() {
        let id = SessionId::new("s");
        let kinds = [
            DispatchError::UnknownSession(id.clone()).kind(),
            DispatchError::CommandInFlight(id.clone()).kind(),
            DispatchError::Timeout(Duration::from_secs(1)).kind(),
            DispatchError::AgentError(Bytes::new()).kind(),
            DispatchError::SessionLost(id).kind(),
            DispatchError::ShuttingDown.kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
