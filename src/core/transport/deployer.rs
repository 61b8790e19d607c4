//! Transport deployer seam.
//!
//! A deployer mounts one network transport for a gateway instance. Mounting
//! produces a [`MountedTransport`]: an axum router answering the instance's
//! routes plus the handles needed to shut it down again.

use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::error::{DeployError, DeployResult};
use crate::domains::instances::{InstanceKey, RuntimeInstance};

/// Mounts and unmounts one transport on gateway instances.
#[async_trait]
pub trait TransportDeployer: Send + Sync {
    /// Short transport name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Mount the transport and record its route path(s) on `instance`.
    fn deploy(&self, instance: &mut RuntimeInstance) -> DeployResult<()>;

    /// Shut the mounted transport down. A no-op when nothing is mounted.
    async fn undeploy(&self, instance: &RuntimeInstance) -> DeployResult<()>;
}

/// A transport mounted on one instance.
#[derive(Clone)]
pub struct MountedTransport {
    router: Router,
    shutdown: CancellationToken,
    tasks: Option<TaskTracker>,
}

impl MountedTransport {
    /// Transport whose sessions stop when `shutdown` is cancelled.
    pub fn new(router: Router, shutdown: CancellationToken) -> Self {
        Self {
            router,
            shutdown,
            tasks: None,
        }
    }

    /// Transport that additionally tracks its session tasks so undeploy can
    /// wait for them.
    pub fn with_tasks(router: Router, shutdown: CancellationToken, tasks: TaskTracker) -> Self {
        Self {
            router,
            shutdown,
            tasks: Some(tasks),
        }
    }

    /// Router answering this transport's routes.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every session and wait, up to `timeout`, for tracked tasks.
    pub async fn shutdown(
        &self,
        transport: &str,
        key: &InstanceKey,
        timeout: Duration,
    ) -> DeployResult<()> {
        self.shutdown.cancel();

        let Some(tasks) = &self.tasks else {
            return Ok(());
        };
        tasks.close();
        debug!("Waiting for {} {} session(s) of {}", tasks.len(), transport, key);

        tokio::time::timeout(timeout, tasks.wait())
            .await
            .map_err(|_| DeployError::ShutdownTimeout {
                transport: transport.to_string(),
                instance: key.to_string(),
                timeout_ms: timeout.as_millis(),
            })
    }
}

/// Deterministic route of one instance endpoint.
pub fn route_path(prefix: &str, key: &InstanceKey, endpoint: &str) -> DeployResult<String> {
    let valid_id = !key.id.is_empty()
        && key
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid_id {
        return Err(DeployError::invalid_route(
            key,
            "id must be a non-empty run of ASCII letters, digits, '-', '_' or '.'",
        ));
    }

    Ok(format!(
        "{}/{}/{}/{}",
        prefix.trim_end_matches('/'),
        key.id,
        key.version,
        endpoint
    ))
}
