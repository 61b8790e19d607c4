//! Live-instance registry.
//!
//! Process-wide map of running instances, keyed by [`InstanceKey`]. One
//! storage is built at startup and shared through an `Arc`; tests build their
//! own.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::error::{InstanceError, InstanceResult};
use super::model::{InstanceKey, RuntimeInstance};

/// Map of live instances guarded by a single read-write lock.
#[derive(Default)]
pub struct InstanceStorage {
    instances: RwLock<HashMap<InstanceKey, Arc<RuntimeInstance>>>,
}

impl InstanceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new instance. Fails if the key is already live.
    pub async fn save(&self, instance: Arc<RuntimeInstance>) -> InstanceResult<()> {
        let key = instance.key();
        let mut instances = self.instances.write().await;
        if instances.contains_key(&key) {
            return Err(InstanceError::AlreadyExists(key));
        }
        debug!("Registered instance {}", key);
        instances.insert(key, instance);
        Ok(())
    }

    pub async fn get(&self, key: &InstanceKey) -> InstanceResult<Arc<RuntimeInstance>> {
        self.instances
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| InstanceError::NotFound(key.clone()))
    }

    /// Remove an instance. Removing an absent key succeeds with `None`.
    pub async fn delete(&self, key: &InstanceKey) -> Option<Arc<RuntimeInstance>> {
        let removed = self.instances.write().await.remove(key);
        if removed.is_some() {
            debug!("Unregistered instance {}", key);
        }
        removed
    }

    pub async fn exists(&self, key: &InstanceKey) -> bool {
        self.instances.read().await.contains_key(key)
    }

    /// Swap in `instance` under one write lock, returning the one it replaced.
    pub async fn replace(&self, instance: Arc<RuntimeInstance>) -> Option<Arc<RuntimeInstance>> {
        let key = instance.key();
        let previous = self.instances.write().await.insert(key.clone(), instance);
        debug!("Replaced instance {} (previous: {})", key, previous.is_some());
        previous
    }

    /// Snapshot of every live instance, ordered by key.
    pub async fn list(&self) -> Vec<Arc<RuntimeInstance>> {
        let mut instances: Vec<_> = self.instances.read().await.values().cloned().collect();
        instances.sort_by_key(|instance| instance.key());
        instances
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }
}
