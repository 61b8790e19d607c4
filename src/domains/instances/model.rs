//! Gateway instance model.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::InstanceError;
use crate::core::server::GatewayServer;
use crate::core::transport::MountedTransport;

/// Identity of a gateway instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub id: String,
    pub version: i64,
}

impl InstanceKey {
    pub fn new(id: impl Into<String>, version: i64) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.version)
    }
}

/// A tool exposed by a gateway instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Identifier resolved by the downstream executor.
    pub tool_id: String,

    /// Name advertised to MCP clients.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON schema of the tool arguments.
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// Deployable configuration of one gateway instance.
///
/// This is the document persisted in the record store and replayed on
/// startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub mcp_id: String,
    pub version: i64,
    pub name: String,

    #[serde(default)]
    pub instructions: String,

    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
}

/// Create and upgrade requests carry a complete configuration.
pub type CreateInstanceRequest = InstanceConfig;

impl InstanceConfig {
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(self.mcp_id.clone(), self.version)
    }

    /// Check the configuration before anything is persisted or mounted.
    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.mcp_id.trim().is_empty() {
            return Err(InstanceError::validation("mcp_id must not be empty"));
        }
        if !self
            .mcp_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(InstanceError::validation(format!(
                "mcp_id '{}' may only contain ASCII letters, digits, '-', '_' and '.'",
                self.mcp_id
            )));
        }
        if self.version < 1 {
            return Err(InstanceError::validation(format!(
                "version must be >= 1, got {}",
                self.version
            )));
        }
        if self.name.trim().is_empty() {
            return Err(InstanceError::validation("name must not be empty"));
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(InstanceError::validation(format!(
                    "tool '{}' has an empty name",
                    tool.tool_id
                )));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(InstanceError::validation(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
        }
        Ok(())
    }
}

/// Update request; the identity comes from the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateInstanceRequest {
    pub name: String,

    #[serde(default)]
    pub instructions: String,

    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
}

impl UpdateInstanceRequest {
    pub fn into_config(self, key: &InstanceKey) -> InstanceConfig {
        InstanceConfig {
            mcp_id: key.id.clone(),
            version: key.version,
            name: self.name,
            instructions: self.instructions,
            tools: self.tools,
        }
    }
}

impl From<InstanceConfig> for UpdateInstanceRequest {
    fn from(config: InstanceConfig) -> Self {
        Self {
            name: config.name,
            instructions: config.instructions,
            tools: config.tools,
        }
    }
}

/// Endpoints of a deployed instance, returned by create, update and upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstanceResponse {
    pub mcp_id: String,
    pub version: i64,
    pub stream_url: String,
    pub sse_url: String,
}

pub type UpdateInstanceResponse = CreateInstanceResponse;

impl From<&RuntimeInstance> for CreateInstanceResponse {
    fn from(instance: &RuntimeInstance) -> Self {
        Self {
            mcp_id: instance.config.mcp_id.clone(),
            version: instance.config.version,
            stream_url: instance.stream_path.clone(),
            sse_url: instance.sse_path.clone(),
        }
    }
}

/// Read view of a live instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub mcp_id: String,
    pub version: i64,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDeclaration>,
    pub stream_url: String,
    pub sse_url: String,
    pub message_url: String,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&RuntimeInstance> for InstanceInfo {
    fn from(instance: &RuntimeInstance) -> Self {
        Self {
            mcp_id: instance.config.mcp_id.clone(),
            version: instance.config.version,
            name: instance.config.name.clone(),
            instructions: instance.config.instructions.clone(),
            tools: instance.config.tools.clone(),
            stream_url: instance.stream_path.clone(),
            sse_url: instance.sse_path.clone(),
            message_url: instance.message_path.clone(),
            disabled: instance.disabled,
            created_at: instance.created_at,
        }
    }
}

/// A running gateway instance.
///
/// Lives only in memory, and only while registered in the instance storage.
pub struct RuntimeInstance {
    pub config: InstanceConfig,
    pub server: GatewayServer,

    /// Streaming HTTP transport, set by its deployer.
    pub stream: Option<MountedTransport>,

    /// SSE push and message transport, set by its deployer.
    pub sse: Option<MountedTransport>,

    pub stream_path: String,
    pub sse_path: String,
    pub message_path: String,

    /// Proxy routes answer 403 while set. Reserved: no lifecycle operation
    /// sets it yet, instances start enabled.
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl RuntimeInstance {
    /// Wrap a configured server; no transport is mounted yet.
    pub fn new(config: InstanceConfig, server: GatewayServer) -> Self {
        Self {
            config,
            server,
            stream: None,
            sse: None,
            stream_path: String::new(),
            sse_path: String::new(),
            message_path: String::new(),
            disabled: false,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> InstanceKey {
        self.config.key()
    }
}

impl fmt::Debug for RuntimeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeInstance")
            .field("key", &self.key())
            .field("stream_path", &self.stream_path)
            .field("sse_path", &self.sse_path)
            .field("message_path", &self.message_path)
            .field("disabled", &self.disabled)
            .field("created_at", &self.created_at)
            .finish()
    }
}
