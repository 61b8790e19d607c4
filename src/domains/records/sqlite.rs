//! SQLite-backed record store.
//!
//! A single connection is shared behind an async mutex. A transaction owns
//! the mutex guard from `BEGIN` to commit or rollback, so at most one
//! transaction is open at a time and queries wait for it to finish. Callers
//! keep transactions short. All SQLite work runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::error::{StoreError, StoreResult};
use super::model::PersistedInstanceRecord;
use super::store::{RecordStore, RecordTx};
use crate::core::config::DatabaseConfig;

/// Path value selecting a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS resource_deploy (
    resource_id  TEXT    NOT NULL,
    type         TEXT    NOT NULL,
    version      INTEGER NOT NULL,
    name         TEXT    NOT NULL DEFAULT '',
    description  TEXT    NOT NULL DEFAULT '',
    config       TEXT    NOT NULL,
    status       TEXT    NOT NULL DEFAULT '',
    create_user  TEXT    NOT NULL DEFAULT '',
    create_time  INTEGER NOT NULL DEFAULT 0,
    update_user  TEXT    NOT NULL DEFAULT '',
    update_time  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (resource_id, type, version)
);
CREATE INDEX IF NOT EXISTS idx_resource_deploy_type ON resource_deploy (type);
";

const COLUMNS: &str = "resource_id, type, version, name, description, config, status, \
                       create_user, create_time, update_user, update_time";

/// Record store persisted in SQLite.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (and initialise if needed) the database described by `config`.
    pub fn open(config: &DatabaseConfig) -> StoreResult<Self> {
        let conn = if config.path == IN_MEMORY_PATH {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        }
        .map_err(|e| StoreError::open(&config.path, e))?;

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| StoreError::open(&config.path, e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::open(&config.path, e))?;

        info!("Record store ready at {}", config.path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&DatabaseConfig {
            path: IN_MEMORY_PATH.to_string(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn begin(&self) -> StoreResult<Box<dyn RecordTx>> {
        let conn = self.conn.clone().lock_owned().await;
        let (conn, ()) = run_blocking(conn, |conn| {
            if !conn.is_autocommit() {
                warn!("Connection left inside a transaction, rolling it back");
                conn.execute_batch("ROLLBACK")
                    .map_err(|e| StoreError::transaction(format!("rollback failed: {e}")))?;
            }
            conn.execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| StoreError::transaction(format!("begin failed: {e}")))
        })
        .await?;
        debug!("Transaction opened");
        Ok(Box::new(SqliteTx { conn: Some(conn) }))
    }

    async fn find(
        &self,
        resource_id: &str,
        record_type: &str,
        version: i64,
    ) -> StoreResult<Option<PersistedInstanceRecord>> {
        let (resource_id, record_type) = (resource_id.to_string(), record_type.to_string());
        let conn = self.conn.clone().lock_owned().await;
        run_blocking(conn, move |conn| {
            select_record(conn, &resource_id, &record_type, version)
        })
        .await
        .map(|(_conn, record)| record)
    }

    async fn list_by_type(&self, record_type: &str) -> StoreResult<Vec<PersistedInstanceRecord>> {
        let record_type = record_type.to_string();
        let conn = self.conn.clone().lock_owned().await;
        run_blocking(conn, move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {COLUMNS} FROM resource_deploy WHERE type = ?1 \
                     ORDER BY resource_id, version"
                ),
                params![record_type],
            )
        })
        .await
        .map(|(_conn, records)| records)
    }

    async fn list_by_resource_id(
        &self,
        resource_id: &str,
        record_type: &str,
    ) -> StoreResult<Vec<PersistedInstanceRecord>> {
        let (resource_id, record_type) = (resource_id.to_string(), record_type.to_string());
        let conn = self.conn.clone().lock_owned().await;
        run_blocking(conn, move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {COLUMNS} FROM resource_deploy WHERE resource_id = ?1 AND type = ?2 \
                     ORDER BY version"
                ),
                params![resource_id, record_type],
            )
        })
        .await
        .map(|(_conn, records)| records)
    }
}

/// Run `op` against the locked connection on the blocking pool and hand the
/// guard back together with its result.
///
/// The guard is released early if `op` fails, so callers that want to keep
/// their transaction open must only use it on success.
async fn run_blocking<T, F>(
    conn: OwnedMutexGuard<Connection>,
    op: F,
) -> StoreResult<(OwnedMutexGuard<Connection>, T)>
where
    F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&conn).map(|value| (conn, value)))
        .await
        .map_err(|e| StoreError::transaction(format!("spawn_blocking failed: {e}")))?
}

/// Transaction bound to the store's only connection.
///
/// The connection guard is held from `BEGIN` until commit or rollback; every
/// statement runs on the blocking pool.
struct SqliteTx {
    conn: Option<OwnedMutexGuard<Connection>>,
}

impl SqliteTx {
    /// Run one statement inside the transaction. A failed statement leaves the
    /// transaction open so the caller can still decide to roll back.
    async fn run<T, F>(&mut self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::transaction("transaction already finished"))?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = op(&conn);
            (conn, result)
        })
        .await
        .map_err(|e| StoreError::transaction(format!("spawn_blocking failed: {e}")))?;
        self.conn = Some(conn);
        result
    }

    /// Finish the transaction with `sql`, releasing the connection.
    async fn finish(&mut self, sql: &'static str) -> StoreResult<()> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::transaction("transaction already finished"))?;
        tokio::task::spawn_blocking(move || {
            let result = conn.execute_batch(sql);
            if result.is_err() && !conn.is_autocommit() {
                rollback_quietly(&conn);
            }
            result.map_err(|e| StoreError::transaction(format!("{sql} failed: {e}")))
        })
        .await
        .map_err(|e| StoreError::transaction(format!("spawn_blocking failed: {e}")))?
    }
}

#[async_trait]
impl RecordTx for SqliteTx {
    async fn insert(&mut self, record: &PersistedInstanceRecord) -> StoreResult<()> {
        let record = record.clone();
        self.run(move |conn| {
            let result = conn.execute(
                &format!(
                    "INSERT INTO resource_deploy ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.resource_id,
                    record.record_type,
                    record.version,
                    record.name,
                    record.description,
                    record.config,
                    record.status,
                    record.create_user,
                    record.create_time,
                    record.update_user,
                    record.update_time,
                ],
            );

            match result {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => Err(StoreError::Duplicate {
                    resource_id: record.resource_id,
                    record_type: record.record_type,
                    version: record.version,
                }),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn update(&mut self, record: &PersistedInstanceRecord) -> StoreResult<usize> {
        let record = record.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE resource_deploy SET name = ?4, description = ?5, config = ?6, \
                 status = ?7, update_user = ?8, update_time = ?9 \
                 WHERE resource_id = ?1 AND type = ?2 AND version = ?3",
                params![
                    record.resource_id,
                    record.record_type,
                    record.version,
                    record.name,
                    record.description,
                    record.config,
                    record.status,
                    record.update_user,
                    record.update_time,
                ],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn delete(
        &mut self,
        resource_id: &str,
        record_type: &str,
        version: i64,
    ) -> StoreResult<usize> {
        let (resource_id, record_type) = (resource_id.to_string(), record_type.to_string());
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM resource_deploy WHERE resource_id = ?1 AND type = ?2 AND version = ?3",
                params![resource_id, record_type, version],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn select(
        &mut self,
        resource_id: &str,
        record_type: &str,
        version: i64,
    ) -> StoreResult<Option<PersistedInstanceRecord>> {
        let (resource_id, record_type) = (resource_id.to_string(), record_type.to_string());
        self.run(move |conn| select_record(conn, &resource_id, &record_type, version))
            .await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.finish("COMMIT").await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.finish("ROLLBACK").await?;
        debug!("Transaction rolled back");
        Ok(())
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if conn.is_autocommit() {
            return;
        }
        warn!("Transaction dropped without commit, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || rollback_quietly(&conn));
            }
            Err(_) => rollback_quietly(&conn),
        }
    }
}

fn rollback_quietly(conn: &Connection) {
    if let Err(e) = conn.execute_batch("ROLLBACK") {
        warn!("Rollback failed: {}", e);
    }
}

fn select_record(
    conn: &Connection,
    resource_id: &str,
    record_type: &str,
    version: i64,
) -> StoreResult<Option<PersistedInstanceRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM resource_deploy \
                 WHERE resource_id = ?1 AND type = ?2 AND version = ?3"
            ),
            params![resource_id, record_type, version],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<PersistedInstanceRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_record)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PersistedInstanceRecord> {
    Ok(PersistedInstanceRecord {
        resource_id: row.get(0)?,
        record_type: row.get(1)?,
        version: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        config: row.get(5)?,
        status: row.get(6)?,
        create_user: row.get(7)?,
        create_time: row.get(8)?,
        update_user: row.get(9)?,
        update_time: row.get(10)?,
    })
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::records::GATEWAY_RECORD_TYPE;

    fn record(id: &str, version: i64) -> PersistedInstanceRecord {
        PersistedInstanceRecord::new_gateway(id, version, "Demo", "", "{}".to_string(), "tester")
    }

    #[tokio::test]
    async fn test_insert_commit_and_list() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("m1", 1)).await.unwrap();
        tx.insert(&record("m1", 2)).await.unwrap();
        tx.insert(&record("m0", 1)).await.unwrap();
        tx.commit().await.unwrap();

        let all = store.list_by_type(GATEWAY_RECORD_TYPE).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| (r.resource_id.as_str(), r.version)).collect();
        assert_eq!(ids, vec![("m0", 1), ("m1", 1), ("m1", 2)]);

        let versions = store
            .list_by_resource_id("m1", GATEWAY_RECORD_TYPE)
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("m1", 1)).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.list_by_type(GATEWAY_RECORD_TYPE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&record("m1", 1)).await.unwrap();
        }

        assert!(store.list_by_type(GATEWAY_RECORD_TYPE).await.unwrap().is_empty());
        // The connection must be usable again after the implicit rollback.
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_reported() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("m1", 1)).await.unwrap();
        let err = tx.insert(&record("m1", 1)).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_update_select_delete() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let original = record("m1", 1);

        let mut tx = store.begin().await.unwrap();
        tx.insert(&original).await.unwrap();
        let revised = original.revised("Renamed", "desc", "{\"x\":1}".into(), "bob");
        assert_eq!(tx.update(&revised).await.unwrap(), 1);

        let fetched = tx.select("m1", GATEWAY_RECORD_TYPE, 1).await.unwrap().unwrap();
        assert_eq!(fetched, revised);

        assert_eq!(tx.delete("m1", GATEWAY_RECORD_TYPE, 1).await.unwrap(), 1);
        assert_eq!(tx.delete("m1", GATEWAY_RECORD_TYPE, 1).await.unwrap(), 0);
        assert!(tx.select("m1", GATEWAY_RECORD_TYPE, 1).await.unwrap().is_none());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_sees_committed_records_only() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("m1", 1)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.find("m1", GATEWAY_RECORD_TYPE, 1).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("m1", 1)).await.unwrap();
        tx.commit().await.unwrap();
        let found = store.find("m1", GATEWAY_RECORD_TYPE, 1).await.unwrap().unwrap();
        assert_eq!(found.create_user, "tester");
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_statements() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
        let err = tx.insert(&record("m1", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Transaction(_)));
        assert!(tx.commit().await.is_err());

        // The committed transaction no longer holds the connection.
        store.list_by_type(GATEWAY_RECORD_TYPE).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_statement_keeps_transaction_open() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("m1", 1)).await.unwrap();
        assert!(tx.insert(&record("m1", 1)).await.is_err());
        tx.insert(&record("m1", 2)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.list_by_resource_id("m1", GATEWAY_RECORD_TYPE).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_type() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut other = record("x1", 1);
        other.record_type = "dataflow".to_string();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("m1", 1)).await.unwrap();
        tx.insert(&other).await.unwrap();
        tx.commit().await.unwrap();

        let gateways = store.list_by_type(GATEWAY_RECORD_TYPE).await.unwrap();
        assert_eq!(gateways.len(), 1);
        assert_eq!(gateways[0].resource_id, "m1");
    }

    #[tokio::test]
    async fn test_on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("gateway.db").to_string_lossy().into_owned(),
            ..Default::default()
        };

        {
            let store = SqliteRecordStore::open(&config).unwrap();
            let mut tx = store.begin().await.unwrap();
            tx.insert(&record("m1", 1)).await.unwrap();
            tx.commit().await.unwrap();
        }

        let store = SqliteRecordStore::open(&config).unwrap();
        assert_eq!(store.list_by_type(GATEWAY_RECORD_TYPE).await.unwrap().len(), 1);
    }
}
