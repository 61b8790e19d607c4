//! Streaming HTTP transport deployer.
//!
//! Mounts rmcp's streamable HTTP service for an instance at
//! `{app_prefix}/{id}/{version}/stream`. Each client session is served by its
//! own clone of the instance's [`GatewayServer`](crate::core::server::GatewayServer).

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::deployer::{MountedTransport, TransportDeployer, route_path};
use super::error::{DeployError, DeployResult};
use super::TransportConfig;
use crate::domains::instances::RuntimeInstance;

/// Deployer for the streaming HTTP transport.
pub struct StreamDeployer {
    config: TransportConfig,
}

impl StreamDeployer {
    pub const NAME: &'static str = "stream";

    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportDeployer for StreamDeployer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn deploy(&self, instance: &mut RuntimeInstance) -> DeployResult<()> {
        let key = instance.key();
        if instance.stream.is_some() {
            return Err(DeployError::already_deployed(Self::NAME, &key));
        }

        let path = route_path(&self.config.app_prefix, &key, "stream")?;
        let shutdown = CancellationToken::new();

        let server = instance.server.clone();
        let service = StreamableHttpService::new(
            move || Ok(server.clone()),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                sse_keep_alive: Some(self.config.sse_keep_alive()),
                stateful_mode: self.config.stream_stateful,
                cancellation_token: shutdown.child_token(),
                ..Default::default()
            },
        );
        let router = Router::new().route_service(&path, service);

        info!("Mounted stream transport for {} at {}", key, path);
        instance.stream_path = path;
        instance.stream = Some(MountedTransport::new(router, shutdown));
        Ok(())
    }

    async fn undeploy(&self, instance: &RuntimeInstance) -> DeployResult<()> {
        let Some(mounted) = &instance.stream else {
            return Ok(());
        };
        let key = instance.key();
        mounted
            .shutdown(Self::NAME, &key, self.config.shutdown_timeout())
            .await?;
        info!("Stopped stream transport for {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::core::server::GatewayServer;
    use crate::domains::instances::InstanceConfig;

    fn instance(id: &str, version: i64) -> RuntimeInstance {
        let config = InstanceConfig {
            mcp_id: id.to_string(),
            version,
            name: "Demo".to_string(),
            instructions: String::new(),
            tools: Vec::new(),
        };
        RuntimeInstance::new(config, GatewayServer::new("Demo", version, ""))
    }

    #[tokio::test]
    async fn test_deploy_records_path() {
        let deployer = StreamDeployer::new(TransportConfig::default());
        let mut instance = instance("m1", 1);

        deployer.deploy(&mut instance).unwrap();
        assert_eq!(instance.stream_path, "/app/m1/1/stream");
        assert!(instance.stream.is_some());
    }

    #[tokio::test]
    async fn test_deploy_twice_fails() {
        let deployer = StreamDeployer::new(TransportConfig::default());
        let mut instance = instance("m1", 1);

        deployer.deploy(&mut instance).unwrap();
        let err = deployer.deploy(&mut instance).unwrap_err();
        assert!(matches!(err, DeployError::AlreadyDeployed { .. }));
    }

    #[tokio::test]
    async fn test_undeploy_without_deploy_is_noop() {
        let deployer = StreamDeployer::new(TransportConfig::default());
        assert!(deployer.undeploy(&instance("m1", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_undeploy_cancels_transport() {
        let deployer = StreamDeployer::new(TransportConfig::default());
        let mut instance = instance("m1", 1);
        deployer.deploy(&mut instance).unwrap();

        deployer.undeploy(&instance).await.unwrap();
        assert!(instance.stream.as_ref().unwrap().is_shut_down());
    }

    #[tokio::test]
    async fn test_router_only_answers_its_path() {
        let deployer = StreamDeployer::new(TransportConfig::default());
        let mut instance = instance("m1", 1);
        deployer.deploy(&mut instance).unwrap();

        let router = instance.stream.as_ref().unwrap().router();
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/app/other/1/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_initialize_round_trip() {
        let deployer = StreamDeployer::new(TransportConfig::default());
        let mut instance = instance("m1", 1);
        deployer.deploy(&mut instance).unwrap();

        let initialize = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            }
        });
        let response = instance
            .stream
            .as_ref()
            .unwrap()
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/app/m1/1/stream")
                    .header("host", "localhost")
                    .header("content-type", "application/json")
                    .header("accept", "application/json, text/event-stream")
                    .body(Body::from(initialize.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("mcp-session-id"));

        let mut body = response.into_body();
        let mut buffer = String::new();
        let reply: Value = loop {
            let complete = &buffer[..buffer.rfind('\n').unwrap_or(0)];
            if let Some(data) = complete
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .find(|data| data.contains("serverInfo"))
            {
                break serde_json::from_str(data.trim()).unwrap();
            }

            let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
                .await
                .expect("no reply within 5s")
                .unwrap()
                .unwrap();
            if let Ok(bytes) = frame.into_data() {
                buffer.push_str(std::str::from_utf8(&bytes).unwrap());
            }
        };
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["serverInfo"]["name"], "Demo");
        assert_eq!(reply["result"]["serverInfo"]["version"], "1");
    }
}
