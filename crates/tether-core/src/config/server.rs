//! Server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration for the Tether server daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to
    pub bind_address: String,

    /// Timeout applied when an operator does not ask for one
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// Upper bound on any operator-requested timeout
    #[serde(with = "duration_secs")]
    pub max_command_timeout: Duration,

    /// Agents not seen for this long are unregistered
    #[serde(with = "duration_secs")]
    pub heartbeat_timeout: Duration,

    /// How often the liveness sweeper runs
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            command_timeout: Duration::from_secs(30),
            max_command_timeout: Duration::from_secs(300),
            heartbeat_timeout: Duration::from_secs(90),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_timeout.is_zero() || self.max_command_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "command timeouts must be greater than zero".to_string(),
            ));
        }
        if self.command_timeout > self.max_command_timeout {
            return Err(ConfigError::Invalid(format!(
                "command_timeout ({:?}) exceeds max_command_timeout ({:?})",
                self.command_timeout, self.max_command_timeout
            )));
        }
        if self.sweep_interval.is_zero() || self.sweep_interval >= self.heartbeat_timeout {
            return Err(ConfigError::Invalid(format!(
                "sweep_interval ({:?}) must be non-zero and shorter than heartbeat_timeout ({:?})",
                self.sweep_interval, self.heartbeat_timeout
            )));
        }
        Ok(())
    }

    /// Resolve the effective timeout for a command
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.command_timeout)
            .min(self.max_command_timeout)
    }
}
