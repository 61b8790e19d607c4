//! Configuration management for the gateway.
//!
//! This module provides a centralized configuration structure populated from
//! environment variables (optionally via a `.env` file) or defaults.

use super::transport::{HttpConfig, TransportConfig, env_parse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Management API and proxy server.
    pub http: HttpConfig,

    /// Per-instance transport settings.
    pub transport: TransportConfig,

    /// Record store.
    pub database: DatabaseConfig,

    /// Downstream tool executor.
    pub executor: ExecutorConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the gateway as reported in logs and on `/`.
    pub name: String,

    /// The version of the gateway.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Whether to include timestamps in log output.
    pub with_timestamps: bool,
}

/// SQLite record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`.
    pub path: String,

    /// How long a writer waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "mcp_gateway.db".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Configuration of the downstream tool executor.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Base URL; calls go to `{base_url}/tools/{tool_id}/execute`.
    pub base_url: String,

    /// Connect timeout in milliseconds. `None` keeps the client default.
    pub connect_timeout_ms: Option<u64>,

    /// Bearer token sent with every call.
    pub token: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            connect_timeout_ms: Some(5_000),
            token: None,
        }
    }
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("base_url", &self.base_url)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "mcp-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                with_timestamps: true,
            },
            http: HttpConfig::default(),
            transport: TransportConfig::default(),
            database: DatabaseConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `MCP_`, for example
    /// `MCP_SERVER_NAME` or `MCP_DATABASE_PATH`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }
        config.logging.with_timestamps =
            env_parse("MCP_LOG_TIMESTAMPS", config.logging.with_timestamps);

        config.http = HttpConfig::from_env();
        config.transport = TransportConfig::from_env();

        if let Ok(path) = std::env::var("MCP_DATABASE_PATH") {
            config.database.path = path;
        }
        config.database.busy_timeout_ms =
            env_parse("MCP_DATABASE_BUSY_TIMEOUT_MS", config.database.busy_timeout_ms);

        if let Ok(base_url) = std::env::var("MCP_EXECUTOR_BASE_URL") {
            config.executor.base_url = base_url;
        }
        if let Ok(raw) = std::env::var("MCP_EXECUTOR_CONNECT_TIMEOUT_MS") {
            match raw.parse() {
                Ok(ms) => config.executor.connect_timeout_ms = Some(ms),
                Err(_) => warn!("Invalid value '{}' for MCP_EXECUTOR_CONNECT_TIMEOUT_MS", raw),
            }
        }

        if let Ok(token) = std::env::var("MCP_EXECUTOR_TOKEN") {
            config.executor.token = Some(token);
            info!("Executor token loaded from environment");
        } else {
            warn!("MCP_EXECUTOR_TOKEN not set - tool calls are sent unauthenticated");
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests run serially
    static ENV_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_database_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_DATABASE_PATH", ":memory:");
            std::env::set_var("MCP_DATABASE_BUSY_TIMEOUT_MS", "250");
        }
        let config = Config::from_env();
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.database.busy_timeout_ms, 250);
        unsafe {
            std::env::remove_var("MCP_DATABASE_PATH");
            std::env::remove_var("MCP_DATABASE_BUSY_TIMEOUT_MS");
        }
    }

    #[test]
    fn test_executor_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_EXECUTOR_BASE_URL", "http://executor:7000");
            std::env::set_var("MCP_EXECUTOR_TOKEN", "test_token_12345");
        }
        let config = Config::from_env();
        assert_eq!(config.executor.base_url, "http://executor:7000");
        assert_eq!(config.executor.token.as_deref(), Some("test_token_12345"));
        unsafe {
            std::env::remove_var("MCP_EXECUTOR_BASE_URL");
            std::env::remove_var("MCP_EXECUTOR_TOKEN");
        }
    }

    #[test]
    fn test_malformed_number_keeps_default() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_DATABASE_BUSY_TIMEOUT_MS", "soon");
        }
        let config = Config::from_env();
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        unsafe {
            std::env::remove_var("MCP_DATABASE_BUSY_TIMEOUT_MS");
        }
    }

    #[test]
    fn test_logging_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_LOG_LEVEL", "debug");
            std::env::set_var("MCP_LOG_TIMESTAMPS", "false");
        }
        let config = Config::from_env();
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.with_timestamps);
        unsafe {
            std::env::remove_var("MCP_LOG_LEVEL");
            std::env::remove_var("MCP_LOG_TIMESTAMPS");
        }
    }

    #[test]
    fn test_token_redacted_in_debug() {
        let executor = ExecutorConfig {
            token: Some("super_secret_token".to_string()),
            ..Default::default()
        };
        let debug_str = format!("{:?}", executor);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super_secret_token"));
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, "mcp_gateway.db");
        assert_eq!(config.executor.base_url, "http://127.0.0.1:9000");
        assert!(config.executor.token.is_none());
        assert_eq!(config.executor.connect_timeout_ms, Some(5_000));
        assert!(config.logging.with_timestamps);
    }
}
