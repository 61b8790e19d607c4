//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the gateway,
//! including error handling, configuration, the per-instance MCP server,
//! application wiring and the transport layer.

pub mod app;
pub mod config;
pub mod error;
pub mod server;
pub mod transport;

pub use app::Gateway;
pub use config::Config;
pub use error::{Error, Result};
pub use server::GatewayServer;
pub use transport::{HttpTransport, TransportConfig};
