//! Tool call outcome.
//!
//! Every gateway tool invocation ends in a [`ToolOutcome`]. Failures are
//! carried inside the tool-call result envelope, so a failing downstream
//! call never tears down the client's MCP session.

use rmcp::model::{CallToolResult, Content};
use tracing::warn;

/// Result of one gateway tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The downstream call completed; the payload is its serialized response.
    Ok(serde_json::Value),

    /// The call failed before or during downstream execution.
    ToolError(String),
}

impl ToolOutcome {
    /// Create a successful outcome.
    pub fn ok(payload: serde_json::Value) -> Self {
        Self::Ok(payload)
    }

    /// Create a failed outcome carrying a diagnostic message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::ToolError(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::ToolError(_))
    }

    /// Convert into the MCP result envelope.
    pub fn into_call_result(self) -> CallToolResult {
        match self {
            Self::Ok(payload) => CallToolResult::success(vec![Content::text(payload.to_string())]),
            Self::ToolError(message) => {
                warn!("Tool call failed: {}", message);
                CallToolResult::error(vec![Content::text(message)])
            }
        }
    }
}
