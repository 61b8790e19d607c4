//! Instance manager.
//!
//! Owns the construction and teardown of runtime instances: building the
//! server, registering its tools, mounting both transports and registering the
//! result in the [`InstanceStorage`]. Persistence is not its concern.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::error::{InstanceError, InstanceResult};
use super::model::{InstanceConfig, InstanceKey, RuntimeInstance};
use super::registry::InstanceStorage;
use crate::core::server::GatewayServer;
use crate::core::transport::TransportDeployer;
use crate::domains::tools::ToolRegistrar;

/// Builds, registers and tears down runtime instances.
pub struct InstanceManager {
    storage: Arc<InstanceStorage>,
    registrar: ToolRegistrar,
    stream: Arc<dyn TransportDeployer>,
    sse: Arc<dyn TransportDeployer>,
}

impl InstanceManager {
    pub fn new(
        storage: Arc<InstanceStorage>,
        registrar: ToolRegistrar,
        stream: Arc<dyn TransportDeployer>,
        sse: Arc<dyn TransportDeployer>,
    ) -> Self {
        Self {
            storage,
            registrar,
            stream,
            sse,
        }
    }

    /// Deployers in mount order.
    fn deployers(&self) -> [&Arc<dyn TransportDeployer>; 2] {
        [&self.stream, &self.sse]
    }

    /// Build and register a new live instance.
    #[instrument(skip(self, config), fields(instance = %config.key()))]
    pub async fn create(&self, config: InstanceConfig) -> InstanceResult<Arc<RuntimeInstance>> {
        let key = config.key();
        if self.storage.exists(&key).await {
            return Err(InstanceError::AlreadyExists(key));
        }

        let instance = Arc::new(self.build(config).await?);
        if let Err(e) = self.storage.save(instance.clone()).await {
            self.unwind(&instance, &self.deployers()).await;
            return Err(e);
        }

        info!("Created instance {}", key);
        Ok(instance)
    }

    /// Undeploy and unregister an instance. Absent keys succeed.
    ///
    /// The SSE transport is only undeployed once the streaming transport has
    /// shut down cleanly; on error the instance stays registered.
    #[instrument(skip(self), fields(instance = %key))]
    pub async fn delete(&self, key: &InstanceKey) -> InstanceResult<()> {
        let instance = match self.storage.get(key).await {
            Ok(instance) => instance,
            Err(InstanceError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.undeploy(&instance).await?;
        self.storage.delete(key).await;
        info!("Deleted instance {}", key);
        Ok(())
    }

    /// Build a new instance for `config` and swap it in for the live one.
    ///
    /// The old instance keeps serving until the new one is fully mounted. A
    /// failure while building leaves it untouched.
    #[instrument(skip(self, config), fields(instance = %config.key()))]
    pub async fn replace(&self, config: InstanceConfig) -> InstanceResult<Arc<RuntimeInstance>> {
        let key = config.key();
        let instance = Arc::new(self.build(config).await?);

        if let Some(previous) = self.storage.replace(instance.clone()).await {
            if let Err(e) = self.undeploy(&previous).await {
                warn!("Failed to undeploy replaced instance {}: {}", key, e);
            }
        }

        info!("Replaced instance {}", key);
        Ok(instance)
    }

    pub async fn get(&self, key: &InstanceKey) -> InstanceResult<Arc<RuntimeInstance>> {
        self.storage.get(key).await
    }

    pub async fn exists(&self, key: &InstanceKey) -> bool {
        self.storage.exists(key).await
    }

    pub async fn list(&self) -> Vec<Arc<RuntimeInstance>> {
        self.storage.list().await
    }

    /// Undeploy and unregister every live instance. Returns how many were
    /// stopped cleanly.
    pub async fn shutdown_all(&self) -> usize {
        let mut stopped = 0;
        for instance in self.storage.list().await {
            let key = instance.key();
            match self.undeploy(&instance).await {
                Ok(()) => stopped += 1,
                Err(e) => warn!("Failed to stop instance {}: {}", key, e),
            }
            self.storage.delete(&key).await;
        }
        info!("Stopped {} instance(s)", stopped);
        stopped
    }

    /// Server, tools and both transports. Mounts completed before a failure
    /// are undeployed again before the error is returned.
    async fn build(&self, config: InstanceConfig) -> InstanceResult<RuntimeInstance> {
        let key = config.key();
        let mut server = GatewayServer::new(
            config.name.clone(),
            config.version,
            config.instructions.clone(),
        );
        self.registrar.register_tools(&config.tools, &mut server)?;

        let mut instance = RuntimeInstance::new(config, server);
        let mut mounted = Vec::with_capacity(2);
        for deployer in self.deployers() {
            if let Err(e) = deployer.deploy(&mut instance) {
                error!("Failed to deploy {} transport for {}: {}", deployer.name(), key, e);
                self.unwind(&instance, &mounted).await;
                return Err(e.into());
            }
            mounted.push(deployer);
        }
        Ok(instance)
    }

    async fn undeploy(&self, instance: &RuntimeInstance) -> InstanceResult<()> {
        for deployer in self.deployers() {
            deployer.undeploy(instance).await?;
        }
        Ok(())
    }

    /// Undeploy `mounted` in reverse order, logging failures.
    async fn unwind(&self, instance: &RuntimeInstance, mounted: &[&Arc<dyn TransportDeployer>]) {
        for deployer in mounted.iter().rev() {
            if let Err(e) = deployer.undeploy(instance).await {
                warn!(
                    "Failed to unwind {} transport for {}: {}",
                    deployer.name(),
                    instance.key(),
                    e
                );
            }
        }
    }
}
