//! MCP Gateway Library
//!
//! Orchestrates versioned MCP gateway instances. Each instance exposes a set
//! of declared tools over a streaming HTTP transport and an SSE transport;
//! tool calls are forwarded to a downstream execution service. Instance
//! configurations are persisted in SQLite and replayed on startup.
//!
//! # Architecture
//!
//! - **core**: configuration, error handling, the per-instance MCP server,
//!   application wiring and the transport layer
//! - **domains**: business logic organized by bounded contexts
//!   - **instances**: live-instance registry, instance manager and the
//!     orchestration service
//!   - **records**: persisted instance records
//!   - **tools**: tool registration and downstream execution
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_gateway::core::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = Gateway::build(Config::from_env())?;
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, Gateway, GatewayServer, Result};
