//! Store traits consumed by the orchestration service.
//!
//! [`RecordStore`] is the transaction-begin provider plus the queries used
//! outside a transaction. [`RecordTx`] carries every mutation; nothing is
//! visible to other callers until [`RecordTx::commit`] succeeds.

use async_trait::async_trait;

use super::error::StoreResult;
use super::model::PersistedInstanceRecord;

/// Access to persisted gateway instance records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> StoreResult<Box<dyn RecordTx>>;

    /// Fetch one committed record.
    async fn find(
        &self,
        resource_id: &str,
        record_type: &str,
        version: i64,
    ) -> StoreResult<Option<PersistedInstanceRecord>>;

    /// All records of the given type, ordered by resource id then version.
    async fn list_by_type(&self, record_type: &str) -> StoreResult<Vec<PersistedInstanceRecord>>;

    /// Every version of one resource, ordered by ascending version.
    async fn list_by_resource_id(
        &self,
        resource_id: &str,
        record_type: &str,
    ) -> StoreResult<Vec<PersistedInstanceRecord>>;
}

/// An open transaction against the record store.
///
/// Dropping a transaction without committing rolls it back. Once committed
/// or rolled back, every further call fails.
#[async_trait]
pub trait RecordTx: Send {
    /// Insert a new record. Fails with a duplicate error on identity collision.
    async fn insert(&mut self, record: &PersistedInstanceRecord) -> StoreResult<()>;

    /// Update the record keyed by `(resource_id, type, version)`.
    ///
    /// Returns the number of rows changed.
    async fn update(&mut self, record: &PersistedInstanceRecord) -> StoreResult<usize>;

    /// Delete one record. Returns the number of rows removed.
    async fn delete(&mut self, resource_id: &str, record_type: &str, version: i64)
    -> StoreResult<usize>;

    /// Fetch one record.
    async fn select(
        &mut self,
        resource_id: &str,
        record_type: &str,
        version: i64,
    ) -> StoreResult<Option<PersistedInstanceRecord>>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}
