//! Configuration loaded from a TOML file
//!
//! The config path defaults to `~/.config/ocpp-backend/config.toml` and can
//! be overridden with the `OCPP_CONFIG` environment variable. Missing file
//! or missing sections fall back to defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket listener for charge points
    pub host: String,
    pub port: u16,
    /// Admin API listener
    pub api_host: String,
    pub api_port: u16,
    /// Heartbeat interval advertised in BootNotification responses (seconds)
    pub heartbeat_interval: u32,
    /// Graceful shutdown timeout (seconds)
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            heartbeat_interval: 300,
            shutdown_timeout: 30,
        }
    }
}

impl ServerConfig {
    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://./ocpp.db?mode=rwc")
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./ocpp.db?mode=rwc".to_string(),
        }
    }
}

/// Which session registry backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Single-instance deployments: in-process table
    Local,
    /// Multi-instance deployments: Redis-backed directory with pub/sub relay
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    pub redis_url: String,
    /// How long a relayed directive may wait for a remote instance (seconds)
    pub reply_timeout: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Local,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            reply_timeout: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Default config path: `~/.config/ocpp-backend/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-backend")
        .join("config.toml")
}
