//! Tools domain module.
//!
//! Gateway instances expose tools that are declared at deployment time and
//! executed by a downstream service at call time.
//!
//! ## Architecture
//!
//! - `registrar.rs` - Attaches declared tools to a gateway server
//! - `executor.rs` - Downstream execution seam and its HTTP implementation
//! - `outcome.rs` - Tagged result of one tool call
//! - `error.rs` - Tool-specific error types

mod error;
mod executor;
mod outcome;
pub mod registrar;

pub use error::{ExecutorError, ToolError};
pub use executor::{ExecuteToolRequest, ExecuteToolResponse, HttpToolExecutor, ToolExecutor};
pub use outcome::ToolOutcome;
pub use registrar::ToolRegistrar;
