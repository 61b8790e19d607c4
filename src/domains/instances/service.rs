//! Orchestration service.
//!
//! Combines the record store and the instance manager. Every mutating call
//! changes the live instance first and then persists the change in a short
//! store transaction that never spans a manager call, so lifecycle work on
//! one key never waits on another key's transports. If persisting fails the
//! live change is compensated, so the registry and the store agree again.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::error::{InstanceError, InstanceResult};
use super::manager::InstanceManager;
use super::model::{
    CreateInstanceRequest, CreateInstanceResponse, InstanceConfig, InstanceInfo, InstanceKey,
    UpdateInstanceRequest, UpdateInstanceResponse,
};
use crate::domains::records::{
    GATEWAY_RECORD_TYPE, PersistedInstanceRecord, RecordStore, RecordTx, StoreResult,
};

/// Entry point for every instance lifecycle operation.
pub struct OrchestrationService {
    store: Arc<dyn RecordStore>,
    manager: Arc<InstanceManager>,
}

impl OrchestrationService {
    pub fn new(store: Arc<dyn RecordStore>, manager: Arc<InstanceManager>) -> Self {
        Self { store, manager }
    }

    pub fn manager(&self) -> &Arc<InstanceManager> {
        &self.manager
    }

    /// Deploy and persist a new instance.
    #[instrument(skip(self, req), fields(instance = %req.key()))]
    pub async fn create(
        &self,
        req: CreateInstanceRequest,
        user: &str,
    ) -> InstanceResult<CreateInstanceResponse> {
        req.validate()?;
        let key = req.key();
        if self.manager.exists(&key).await {
            return Err(InstanceError::AlreadyExists(key));
        }

        let record = PersistedInstanceRecord::new_gateway(
            &req.mcp_id,
            req.version,
            &req.name,
            &req.instructions,
            encode(&req)?,
            user,
        );

        let instance = self.manager.create(req).await?;
        if let Err(e) = self.insert_record(&record).await {
            error!("Persisting {} failed, removing the live instance: {}", key, e);
            if let Err(undo) = self.manager.delete(&key).await {
                warn!("Failed to remove {}: {}", key, undo);
            }
            return Err(e);
        }

        info!("Instance {} created by {}", key, user);
        Ok(CreateInstanceResponse::from(instance.as_ref()))
    }

    /// Replace the configuration of a persisted instance.
    #[instrument(skip(self, req), fields(instance = %key))]
    pub async fn update(
        &self,
        key: &InstanceKey,
        req: UpdateInstanceRequest,
        user: &str,
    ) -> InstanceResult<UpdateInstanceResponse> {
        let config = req.into_config(key);
        config.validate()?;
        let encoded = encode(&config)?;

        let existing = self
            .store
            .find(&key.id, GATEWAY_RECORD_TYPE, key.version)
            .await?
            .ok_or_else(|| InstanceError::NotFound(key.clone()))?;
        let record = existing.revised(&config.name, &config.instructions, encoded, user);

        let instance = self.manager.replace(config).await?;
        if let Err(e) = self.update_record(key, &record).await {
            error!("Persisting update of {} failed, restoring it: {}", key, e);
            self.restore(key, &existing).await;
            return Err(e);
        }

        info!("Instance {} updated by {}", key, user);
        Ok(UpdateInstanceResponse::from(instance.as_ref()))
    }

    /// Put the instance described by `previous` back live.
    async fn restore(&self, key: &InstanceKey, previous: &PersistedInstanceRecord) {
        let restored = match decode(previous) {
            Ok(config) => self.manager.replace(config).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            warn!("Failed to restore {}, removing it: {}", key, e);
            if let Err(e) = self.manager.delete(key).await {
                warn!("Failed to remove {}: {}", key, e);
            }
        }
    }

    /// Remove one version. Absent versions succeed.
    #[instrument(skip(self), fields(instance = %key))]
    pub async fn delete(&self, key: &InstanceKey) -> InstanceResult<()> {
        let existing = self
            .store
            .find(&key.id, GATEWAY_RECORD_TYPE, key.version)
            .await?;
        self.manager.delete(key).await?;

        if let Some(record) = existing {
            if let Err(e) = self.delete_record(key).await {
                error!("Persisting removal of {} failed, re-creating it: {}", key, e);
                let recreated = match decode(&record) {
                    Ok(config) => self.manager.create(config).await.map(|_| ()),
                    Err(e) => Err(e),
                };
                if let Err(undo) = recreated {
                    warn!("Failed to re-create {}: {}", key, undo);
                }
                return Err(e);
            }
        }

        info!("Instance {} deleted", key);
        Ok(())
    }

    async fn insert_record(&self, record: &PersistedInstanceRecord) -> InstanceResult<()> {
        let mut tx = self.store.begin().await?;
        let staged = tx.insert(record).await;
        finish(tx, staged).await
    }

    async fn update_record(
        &self,
        key: &InstanceKey,
        record: &PersistedInstanceRecord,
    ) -> InstanceResult<()> {
        let mut tx = self.store.begin().await?;
        let staged = tx.update(record).await;
        if finish(tx, staged).await? == 0 {
            return Err(InstanceError::NotFound(key.clone()));
        }
        Ok(())
    }

    async fn delete_record(&self, key: &InstanceKey) -> InstanceResult<()> {
        let mut tx = self.store.begin().await?;
        let staged = tx.delete(&key.id, GATEWAY_RECORD_TYPE, key.version).await;
        finish(tx, staged).await.map(|_| ())
    }

    /// Remove every persisted version of a resource, lowest first.
    ///
    /// Stops at the first failing version; versions already removed stay
    /// removed. Returns how many versions were removed.
    #[instrument(skip(self))]
    pub async fn delete_by_resource_id(&self, resource_id: &str) -> InstanceResult<usize> {
        let records = self
            .store
            .list_by_resource_id(resource_id, GATEWAY_RECORD_TYPE)
            .await?;

        for record in &records {
            self.delete(&InstanceKey::new(resource_id, record.version))
                .await?;
        }

        info!("Deleted {} version(s) of {}", records.len(), resource_id);
        Ok(records.len())
    }

    /// Update the instance if it is live, create it otherwise.
    #[instrument(skip(self, req), fields(instance = %req.key()))]
    pub async fn upgrade(
        &self,
        req: CreateInstanceRequest,
        user: &str,
    ) -> InstanceResult<CreateInstanceResponse> {
        let key = req.key();
        if self.manager.exists(&key).await {
            self.update(&key, req.into(), user).await
        } else {
            self.create(req, user).await
        }
    }

    pub async fn get(&self, key: &InstanceKey) -> InstanceResult<InstanceInfo> {
        let instance = self.manager.get(key).await?;
        Ok(InstanceInfo::from(instance.as_ref()))
    }

    pub async fn list(&self) -> Vec<InstanceInfo> {
        self.manager
            .list()
            .await
            .iter()
            .map(|instance| InstanceInfo::from(instance.as_ref()))
            .collect()
    }

    /// Rebuild the live registry from the persisted gateway records.
    ///
    /// Replays in store order and stops at the first record that cannot be
    /// decoded or deployed. Returns the number of instances started.
    pub async fn init_on_startup(&self) -> InstanceResult<usize> {
        let records = self.store.list_by_type(GATEWAY_RECORD_TYPE).await?;
        info!("Replaying {} persisted instance(s)", records.len());

        for record in &records {
            let config = decode(record)?;
            self.manager.create(config).await?;
        }
        Ok(records.len())
    }
}

/// Commit `tx` if the staged statement succeeded, roll it back otherwise.
async fn finish<T>(mut tx: Box<dyn RecordTx>, staged: StoreResult<T>) -> InstanceResult<T> {
    match staged {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback failed: {}", rollback);
            }
            Err(e.into())
        }
    }
}

fn encode(config: &InstanceConfig) -> InstanceResult<String> {
    serde_json::to_string(config).map_err(|e| InstanceError::config(&config.key(), e))
}

/// Decode a record's config. The record identity wins over the ids stored
/// inside the document.
fn decode(record: &PersistedInstanceRecord) -> InstanceResult<InstanceConfig> {
    let key = InstanceKey::new(record.resource_id.clone(), record.version);
    let mut config: InstanceConfig =
        serde_json::from_str(&record.config).map_err(|e| InstanceError::config(&key, e))?;
    config.mcp_id = key.id;
    config.version = key.version;
    Ok(config)
}
