//! Test doubles shared by the instance, service and HTTP tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::manager::InstanceManager;
use super::model::{InstanceConfig, RuntimeInstance, ToolDeclaration};
use super::registry::InstanceStorage;
use crate::core::transport::{
    DeployError, DeployResult, SseDeployer, StreamDeployer, TransportConfig, TransportDeployer,
};
use crate::domains::tools::{
    ExecuteToolRequest, ExecuteToolResponse, ExecutorError, ToolExecutor, ToolRegistrar,
};

/// Executor answering every call with `200 {"ok": true}`.
pub struct MockExecutor;

#[async_trait]
impl ToolExecutor for MockExecutor {
    async fn execute_tool(
        &self,
        _tool_id: &str,
        _request: ExecuteToolRequest,
    ) -> Result<ExecuteToolResponse, ExecutorError> {
        Ok(ExecuteToolResponse {
            status_code: 200,
            body: json!({"ok": true}),
            ..Default::default()
        })
    }
}

/// Deployer counting calls, optionally failing or stalling them.
#[derive(Default)]
pub struct RecordingDeployer {
    pub deployed: AtomicUsize,
    pub undeployed: AtomicUsize,
    fail_deploy: bool,
    fail_undeploy: bool,
    undeploy_delay: Duration,
}

impl RecordingDeployer {
    pub fn failing() -> Self {
        Self {
            fail_deploy: true,
            ..Default::default()
        }
    }

    pub fn failing_undeploy() -> Self {
        Self {
            fail_undeploy: true,
            ..Default::default()
        }
    }

    pub fn slow_undeploy(delay: Duration) -> Self {
        Self {
            undeploy_delay: delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransportDeployer for RecordingDeployer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn deploy(&self, _instance: &mut RuntimeInstance) -> DeployResult<()> {
        if self.fail_deploy {
            return Err(DeployError::mount("recording", "refused"));
        }
        self.deployed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn undeploy(&self, _instance: &RuntimeInstance) -> DeployResult<()> {
        if !self.undeploy_delay.is_zero() {
            tokio::time::sleep(self.undeploy_delay).await;
        }
        self.undeployed.fetch_add(1, Ordering::SeqCst);
        if self.fail_undeploy {
            return Err(DeployError::mount("recording", "stuck"));
        }
        Ok(())
    }
}

pub fn demo_config(id: &str, version: i64) -> InstanceConfig {
    InstanceConfig {
        mcp_id: id.to_string(),
        version,
        name: "Demo".to_string(),
        instructions: String::new(),
        tools: vec![ToolDeclaration {
            tool_id: "t1".to_string(),
            name: "echo".to_string(),
            description: String::new(),
            input_schema: serde_json::Value::Null,
        }],
    }
}

pub fn mock_registrar() -> ToolRegistrar {
    ToolRegistrar::new(Arc::new(MockExecutor))
}

/// Manager with the real transports and a private storage.
pub fn real_manager() -> InstanceManager {
    let transport = TransportConfig::default();
    InstanceManager::new(
        Arc::new(InstanceStorage::new()),
        mock_registrar(),
        Arc::new(StreamDeployer::new(transport.clone())),
        Arc::new(SseDeployer::new(transport, "/mcp")),
    )
}
