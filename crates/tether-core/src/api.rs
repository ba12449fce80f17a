//! HTTP API types shared by the server and its clients
//!
//! JSON bodies for the agent-facing endpoint (`/agent/...`) and the
//! operator-facing endpoint (`/api/...`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::serde_utils::option_duration_secs;
use crate::exchange::ExchangeId;
use crate::types::{AgentInfo, ConnectionStatus, SessionId};

/// Command handed to an agent polling for work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommand {
    /// Must be echoed back in [`CommandResult`]
    pub exchange_id: ExchangeId,
    /// Command to execute
    pub request: String,
}

/// Result posted by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exchange this result answers
    pub exchange_id: ExchangeId,
    /// Command output, or failure detail when `has_error` is set
    #[serde(default)]
    pub response: String,
    /// Whether the command failed on the agent
    #[serde(default)]
    pub has_error: bool,
}

/// Operator request to run a command on a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteCommand {
    /// Command to execute
    pub command: String,
    /// Wait limit; the server default applies when absent
    #[serde(default, rename = "timeout_secs", with = "option_duration_secs")]
    pub timeout: Option<Duration>,
}

/// Successful command output returned to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub response: String,
}

/// Error body for any non-2xx API response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable kind, e.g. `command_in_flight`
    pub kind: String,
    /// Human-readable message
    pub error: String,
}

/// Session information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub status: ConnectionStatus,
    /// Unix millis
    pub connected_at: u64,
    /// Unix millis
    pub last_seen_at: u64,
    pub info: AgentInfo,
}

/// Server status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub session_count: usize,
    pub pending_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_command_default_timeout() {
        let req: ExecuteCommand = serde_json::from_str(r#"{"command":"whoami"}"#).unwrap();
        assert_eq!(req.command, "whoami");
        assert_eq!(req.timeout, None);
    }

    #[test]
    fn test_execute_command_with_timeout() {
        let req: ExecuteCommand =
            serde_json::from_str(r#"{"command":"whoami","timeout_secs":2}"#).unwrap();
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_command_result_defaults() {
        let result: CommandResult = serde_json::from_str(r#"{"exchange_id":4}"#).unwrap();
        assert_eq!(result.exchange_id, ExchangeId(4));
        assert!(result.response.is_empty());
        assert!(!result.has_error);
    }

    #[test]
    fn test_pending_command_wire_shape() {
        let cmd = PendingCommand {
            exchange_id: ExchangeId(9),
            request: "uptime".into(),
        };
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"exchange_id":9,"request":"uptime"}"#
        );
    }
}
