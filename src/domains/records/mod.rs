//! Records domain module.
//!
//! Durable storage for gateway instance configuration. One row per
//! `(resource_id, type, version)` holds the JSON-encoded instance config
//! together with audit columns.
//!
//! ## Architecture
//!
//! - `model.rs` - The persisted row type
//! - `store.rs` - Store and transaction traits consumed by the orchestrator
//! - `sqlite.rs` - SQLite implementation
//! - `error.rs` - Store error types

mod error;
mod model;
mod sqlite;
mod store;

pub use error::{StoreError, StoreResult};
pub use model::{GATEWAY_RECORD_TYPE, PersistedInstanceRecord, STATUS_DEPLOYED, now_nanos};
pub use sqlite::SqliteRecordStore;
pub use store::{RecordStore, RecordTx};
