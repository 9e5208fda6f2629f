//! Configuration management for bookledger

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Identifier other nodes know this one by; defaults to `host:api_port`.
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            node_id: None,
            bootstrap_peers: Vec::new(),
        }
    }
}

impl NetworkConfig {
    pub fn node_id(&self) -> String {
        self.node_id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.host, self.api_port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Seconds between automatic resolution rounds; 0 disables them.
    #[serde(default)]
    pub interval_secs: u64,
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
    #[serde(default = "default_max_peer_failures")]
    pub max_peer_failures: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 0,
            peer_timeout_ms: default_peer_timeout_ms(),
            max_peer_failures: default_max_peer_failures(),
        }
    }
}

impl SyncConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Checks values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.network.api_port == 0 {
            return Err(ChainError::ConfigError(
                "network.api_port must be non-zero".to_string(),
            ));
        }
        if self.network.host.trim().is_empty() {
            return Err(ChainError::ConfigError(
                "network.host must be set".to_string(),
            ));
        }
        if self.sync.peer_timeout_ms == 0 {
            return Err(ChainError::ConfigError(
                "sync.peer_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads configuration from `path`; a missing file yields the defaults.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let config: Config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_peer_timeout_ms() -> u64 {
    5_000
}

fn default_max_peer_failures() -> u32 {
    crate::network::DEFAULT_MAX_PEER_FAILURES
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.network.api_port, 5000);
        assert_eq!(config.network.node_id(), "127.0.0.1:5000");
        assert!(config.sync.interval().is_none());
        assert_eq!(config.sync.peer_timeout(), Duration::from_secs(5));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[network]
api_port = 5001
bootstrap_peers = ["127.0.0.1:5000"]

[sync]
interval_secs = 30
"#
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.network.api_port, 5001);
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.network.bootstrap_peers, vec!["127.0.0.1:5000"]);
        assert_eq!(config.sync.interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.sync.peer_timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync]\npeer_timeout_ms = 0").unwrap();
        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, ChainError::ConfigError(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network\napi_port = ").unwrap();
        assert!(matches!(
            load_config_from(file.path()),
            Err(ChainError::ConfigError(_))
        ));
    }
}
