//! Downstream tool execution.
//!
//! Gateway tools do not run anything themselves: each call is forwarded to
//! an execution service that resolves the tool id and performs the actual
//! HTTP request. [`ToolExecutor`] is that seam; [`HttpToolExecutor`] talks to
//! the execution service over HTTP.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::error::ExecutorError;
use crate::core::config::ExecutorConfig;

/// Normalised request handed to the executor.
///
/// Header, query and path values are always strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteToolRequest {
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: serde_json::Value,

    #[serde(default)]
    pub query_params: HashMap<String, String>,

    #[serde(default)]
    pub path_params: HashMap<String, String>,
}

/// Structured result of one downstream execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteToolResponse {
    #[serde(default)]
    pub status_code: u16,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub duration_ms: u64,
}

/// Executes one tool by id.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_tool(
        &self,
        tool_id: &str,
        request: ExecuteToolRequest,
    ) -> Result<ExecuteToolResponse, ExecutorError>;
}

/// Executor that forwards calls to the execution service over HTTP.
pub struct HttpToolExecutor {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpToolExecutor {
    /// Build an executor from configuration.
    ///
    /// No request timeout is set: a call is bounded by the inbound request.
    pub fn new(config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Endpoint executing the given tool.
    pub fn endpoint(&self, tool_id: &str) -> String {
        format!("{}/tools/{}/execute", self.base_url, tool_id)
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    #[instrument(skip(self, request))]
    async fn execute_tool(
        &self,
        tool_id: &str,
        request: ExecuteToolRequest,
    ) -> Result<ExecuteToolResponse, ExecutorError> {
        let url = self.endpoint(tool_id);
        debug!("Forwarding tool call to {}", url);

        let mut call = self.client.post(&url).json(&request);
        if let Some(token) = &self.token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(ExecutorError::decode)
    }
}
