//! Transport layer of the gateway.
//!
//! Two layers live here:
//! - **HTTP**: the single axum server carrying the REST management API and
//!   proxying instance traffic.
//! - **Deployers**: per-instance transports mounted behind that server, the
//!   streaming HTTP transport ([`StreamDeployer`]) and the SSE transport
//!   ([`SseDeployer`]).

mod config;
mod deployer;
mod error;
mod sse;
mod stream;

pub mod http;

pub use config::{HttpConfig, TransportConfig};
pub(crate) use config::env_parse;
pub use deployer::{MountedTransport, TransportDeployer, route_path};
pub use error::{DeployError, DeployResult, TransportError, TransportResult};
pub use http::HttpTransport;
pub use sse::SseDeployer;
pub use stream::StreamDeployer;
