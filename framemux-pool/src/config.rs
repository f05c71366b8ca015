//! Proxy configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FRAMEMUX_CONFIG or --config)
//! 3. Environment variables

use crate::connection::TcpConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Proxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend configuration.
    pub backend: BackendConfig,
    /// Pool configuration.
    pub pool: PoolConfig,
}

impl Config {
    /// Loads configuration from `path` (defaults if `None`), then applies
    /// environment variable overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(
        path: Option<&Path>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(var);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.backend.apply_overrides(&var);
        self.pool.apply_overrides(&var);
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "pool.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address.
    #[serde(with = "socket_addr_serde")]
    pub addr: SocketAddr,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Set TCP_NODELAY on backend sockets.
    pub nodelay: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5432)),
            connect_timeout_ms: 5000,
            nodelay: true,
        }
    }
}

impl BackendConfig {
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("FRAMEMUX_BACKEND") {
            if let Ok(parsed) = addr.parse() {
                self.addr = parsed;
            }
        }

        if let Some(timeout) = var("FRAMEMUX_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.connect_timeout_ms = ms;
            }
        }

        if let Some(nodelay) = var("FRAMEMUX_NODELAY") {
            self.nodelay = nodelay == "1" || nodelay.to_lowercase() == "true";
        }
    }

    /// Returns connect timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Builds the TCP transport configuration.
    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig::new(self.addr)
            .with_connect_timeout(self.connect_timeout())
            .with_nodelay(self.nodelay)
    }
}

/// Pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent backend connections.
    pub max_connections: usize,
    /// Idle response buffers kept for reuse (0 = same as max_connections).
    pub buffer_pool_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            buffer_pool_size: 0,
        }
    }
}

impl PoolConfig {
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(max) = var("FRAMEMUX_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }

        if let Some(size) = var("FRAMEMUX_BUFFER_POOL_SIZE") {
            if let Ok(n) = size.parse() {
                self.buffer_pool_size = n;
            }
        }
    }

    /// Returns the effective number of idle buffers to retain.
    pub fn buffer_pool_size(&self) -> usize {
        if self.buffer_pool_size == 0 {
            self.max_connections
        } else {
            self.buffer_pool_size
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.addr.port(), 5432);
        assert_eq!(config.backend.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.pool.max_connections, 16);
        assert_eq!(config.pool.buffer_pool_size(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framemux.yaml");

        let mut config = Config::default();
        config.backend.addr = "10.0.0.7:6000".parse().unwrap();
        config.pool.max_connections = 3;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.backend.addr, config.backend.addr);
        assert_eq!(loaded.pool.max_connections, 3);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framemux.yaml");
        std::fs::write(&path, "pool:\n  max_connections: 4\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.backend.addr, BackendConfig::default().addr);
        assert!(config.backend.nodelay);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/framemux.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framemux.yaml");
        std::fs::write(&path, "backend:\n  addr: not-an-address\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
        assert!(err.to_string().contains("framemux.yaml"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FRAMEMUX_BACKEND", "192.168.1.2:7000"),
            ("FRAMEMUX_CONNECT_TIMEOUT_MS", "250"),
            ("FRAMEMUX_NODELAY", "false"),
            ("FRAMEMUX_MAX_CONNECTIONS", "32"),
            ("FRAMEMUX_BUFFER_POOL_SIZE", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.backend.addr, "192.168.1.2:7000".parse().unwrap());
        assert_eq!(config.backend.connect_timeout(), Duration::from_millis(250));
        assert!(!config.backend.nodelay);
        assert_eq!(config.pool.max_connections, 32);
        assert_eq!(config.pool.buffer_pool_size(), 8);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "FRAMEMUX_BACKEND" => Some("nope".to_string()),
            "FRAMEMUX_MAX_CONNECTIONS" => Some("-1".to_string()),
            _ => None,
        });

        assert_eq!(config.backend.addr, BackendConfig::default().addr);
        assert_eq!(config.pool.max_connections, 16);
    }

    #[test]
    fn test_load_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framemux.yaml");
        std::fs::write(&path, "backend:\n  addr: 10.0.0.1:6000\npool:\n  max_connections: 4\n")
            .unwrap();

        let config = Config::load_with(Some(&path), |key| match key {
            "FRAMEMUX_MAX_CONNECTIONS" => Some("8".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.backend.addr, "10.0.0.1:6000".parse().unwrap());
        assert_eq!(config.pool.max_connections, 8);
    }

    #[test]
    fn test_load_without_file() {
        let config = Config::load_with(None, |_| None).unwrap();
        assert_eq!(config.pool.max_connections, 16);
    }

    #[test]
    fn test_load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framemux.yaml");
        std::fs::write(&path, "pool:\n  max_connections: 0\n").unwrap();

        let err = Config::load_with(Some(&path), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_connections_rejected() {
        let mut config = Config::default();
        config.pool.max_connections = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_tcp_config() {
        let config = BackendConfig::default();
        let tcp = config.tcp_config();
        assert_eq!(tcp.addr, config.addr);
        assert_eq!(tcp.connect_timeout, Duration::from_millis(5000));
        assert!(tcp.nodelay);
    }
}
