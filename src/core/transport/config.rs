//! Transport configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// HTTP server configuration (REST surface and proxy routes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Port number to listen on.
    pub port: u16,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Prefix every REST and proxy route is nested under.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Enable CORS for browser clients.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,
}

/// Configuration shared by the per-instance transport deployers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Prefix of instance routes, e.g. `/app` yields `/app/{id}/{version}/stream`.
    #[serde(default = "default_app_prefix")]
    pub app_prefix: String,

    /// Interval between SSE keep-alive comments, in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub sse_keep_alive_secs: u64,

    /// Upper bound for undeploying one transport, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Whether the streaming HTTP transport keeps per-client sessions.
    #[serde(default = "default_stateful")]
    pub stream_stateful: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_prefix() -> String {
    "/mcp".to_string()
}

fn default_cors() -> bool {
    true
}

fn default_app_prefix() -> String {
    "/app".to_string()
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_stateful() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: default_host(),
            api_prefix: default_api_prefix(),
            enable_cors: default_cors(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            app_prefix: default_app_prefix(),
            sse_keep_alive_secs: default_keep_alive_secs(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            stream_stateful: default_stateful(),
        }
    }
}

impl HttpConfig {
    /// Load HTTP config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("MCP_HTTP_PORT", defaults.port),
            host: std::env::var("MCP_HTTP_HOST").unwrap_or(defaults.host),
            api_prefix: std::env::var("MCP_HTTP_API_PREFIX").unwrap_or(defaults.api_prefix),
            enable_cors: std::env::var("MCP_HTTP_CORS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.enable_cors),
        }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get a description of this server for logging.
    pub fn description(&self) -> String {
        format!("HTTP on {}{}", self.address(), self.api_prefix)
    }
}

impl TransportConfig {
    /// Load transport config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            app_prefix: std::env::var("MCP_APP_PREFIX").unwrap_or(defaults.app_prefix),
            sse_keep_alive_secs: env_parse("MCP_SSE_KEEP_ALIVE_SECS", defaults.sse_keep_alive_secs),
            shutdown_timeout_ms: env_parse("MCP_SHUTDOWN_TIMEOUT_MS", defaults.shutdown_timeout_ms),
            stream_stateful: std::env::var("MCP_STREAM_STATEFUL")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.stream_stateful),
        }
    }

    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// missing or malformed.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value '{}' for {}, using {}", raw, key, default);
            default
        }),
        Err(_) => default,
    }
}
