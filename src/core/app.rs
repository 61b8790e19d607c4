//! Application wiring.
//!
//! Builds the component graph once per process (record store, executor,
//! registry, deployers, manager, service) and runs the HTTP server around it.

use std::sync::Arc;

use axum::Router;
use tracing::{info, warn};

use super::config::Config;
use super::error::Result;
use super::transport::http::{AppState, build_router};
use super::transport::{HttpTransport, SseDeployer, StreamDeployer};
use crate::domains::instances::{InstanceManager, InstanceStorage, OrchestrationService};
use crate::domains::records::{RecordStore, SqliteRecordStore};
use crate::domains::tools::{HttpToolExecutor, ToolExecutor, ToolRegistrar};

/// A fully wired gateway.
pub struct Gateway {
    config: Config,
    service: Arc<OrchestrationService>,
}

impl Gateway {
    /// Open the configured store and executor and wire everything up.
    pub fn build(config: Config) -> Result<Self> {
        let store = SqliteRecordStore::open(&config.database)?;
        let executor = HttpToolExecutor::new(&config.executor)?;
        Ok(Self::with_parts(config, Arc::new(store), Arc::new(executor)))
    }

    /// Wire a gateway around an existing store and executor.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn RecordStore>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        let storage = Arc::new(InstanceStorage::new());
        let stream = Arc::new(StreamDeployer::new(config.transport.clone()));
        let sse = Arc::new(SseDeployer::new(
            config.transport.clone(),
            config.http.api_prefix.clone(),
        ));
        let manager = Arc::new(InstanceManager::new(
            storage,
            ToolRegistrar::new(executor),
            stream,
            sse,
        ));

        Self {
            service: Arc::new(OrchestrationService::new(store, manager)),
            config,
        }
    }

    pub fn service(&self) -> &Arc<OrchestrationService> {
        &self.service
    }

    /// REST API and proxy routes.
    pub fn router(&self) -> Router {
        let state = AppState::new(self.service.clone(), self.config.server.name.clone());
        build_router(state, &self.config.http, &self.config.transport.app_prefix)
    }

    /// Replay persisted instances, then serve until Ctrl-C.
    ///
    /// Every live instance is stopped before returning.
    pub async fn run(self) -> Result<()> {
        let restored = self.service.init_on_startup().await?;
        info!("Restored {} instance(s) from the record store", restored);

        info!("Starting {}", self.config.http.description());
        let served = HttpTransport::new(self.config.http.clone())
            .run(self.router(), shutdown_signal())
            .await;

        self.service.manager().shutdown_all().await;
        Ok(served?)
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
