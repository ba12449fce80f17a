//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a connected agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Descriptive details an agent may report when it connects.
///
/// None of these fields are used for identification; the session ID is
/// the only key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInfo {
    /// Hostname of the agent machine
    pub hostname: Option<String>,
    /// User the agent runs as
    pub username: Option<String>,
    /// Operating system
    pub os: Option<String>,
    /// CPU architecture
    pub arch: Option<String>,
}

/// Connection status for an agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Agent is connected and polling
    Connected,
    /// Agent has disconnected or was reaped by the sweeper
    Disconnected,
}

impl ConnectionStatus {
    /// Compact encoding for atomic storage
    pub const fn as_u8(self) -> u8 {
        match self {
            ConnectionStatus::Connected => 0,
            ConnectionStatus::Disconnected => 1,
        }
    }

    /// Decode from [`ConnectionStatus::as_u8`]; unknown values read as disconnected
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new("dev-1");
        assert_eq!(format!("{}", id), "dev-1");
        assert_eq!(id.as_str(), "dev-1");
    }

    #[test]
    fn test_session_id_serializes_as_plain_string() {
        let id = SessionId::from("dev-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""dev-1""#);
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(format!("{}", ConnectionStatus::Connected), "connected");
        assert_eq!(
            format!("{}", ConnectionStatus::Disconnected),
            "disconnected"
        );
    }

    #[test]
    fn test_connection_status_u8_encoding() {
        for status in [ConnectionStatus::Connected, ConnectionStatus::Disconnected] {
            assert_eq!(ConnectionStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(ConnectionStatus::from_u8(42), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_agent_info_partial_json() {
        let info: AgentInfo = serde_json::from_str(r#"{"hostname":"box"}"#).unwrap();
        assert_eq!(info.hostname.as_deref(), Some("box"));
        assert!(info.os.is_none());
    }
}
