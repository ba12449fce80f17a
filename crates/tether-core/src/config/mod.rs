//! Configuration management for Tether

mod server;
pub mod serde_utils;

pub use server::ServerConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = load_config::<ServerConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == path));
    }

    #[test]
    fn test_load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "bind_address = \"127.0.0.1:9000\"\n\
             command_timeout = 5\n\
             max_command_timeout = 60\n\
             heartbeat_timeout = 30\n\
             sweep_interval = 3\n",
        )
        .unwrap();

        let loaded: ServerConfig = load_config(&path).unwrap();
        assert_eq!(loaded.bind_address, "127.0.0.1:9000");
        assert_eq!(loaded.command_timeout, Duration::from_secs(5));
        assert_eq!(loaded.max_command_timeout, Duration::from_secs(60));
        assert_eq!(loaded.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(loaded.sweep_interval, Duration::from_secs(3));
        loaded.validate().unwrap();
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "command_timeout = 12\n").unwrap();

        let loaded: ServerConfig = load_config(&path).unwrap();
        assert_eq!(loaded.command_timeout, Duration::from_secs(12));
        assert_eq!(loaded.bind_address, ServerConfig::default().bind_address);
    }

    #[test]
    fn test_load_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "command_timeout = \"soon\"\n").unwrap();

        let err = load_config::<ServerConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
