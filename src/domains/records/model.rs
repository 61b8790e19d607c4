//! Persisted record model.

use serde::{Deserialize, Serialize};

/// Type tag marking gateway instance rows among other resource-deploy kinds.
pub const GATEWAY_RECORD_TYPE: &str = "mcp";

/// Status written on create and update.
pub const STATUS_DEPLOYED: &str = "deployed";

/// One durable row of the `resource_deploy` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedInstanceRecord {
    /// Stable external identifier.
    pub resource_id: String,

    /// Resource kind tag, [`GATEWAY_RECORD_TYPE`] for gateway instances.
    #[serde(rename = "type")]
    pub record_type: String,

    /// Version, part of the identity.
    pub version: i64,

    pub name: String,
    pub description: String,

    /// JSON text of the instance configuration.
    pub config: String,

    pub status: String,
    pub create_user: String,

    /// Creation time, nanoseconds since the Unix epoch.
    pub create_time: i64,

    pub update_user: String,

    /// Last update time, nanoseconds since the Unix epoch.
    pub update_time: i64,
}

impl PersistedInstanceRecord {
    /// Build a fresh gateway record stamped with the current time.
    pub fn new_gateway(
        resource_id: impl Into<String>,
        version: i64,
        name: impl Into<String>,
        description: impl Into<String>,
        config: String,
        user: &str,
    ) -> Self {
        let now = now_nanos();
        Self {
            resource_id: resource_id.into(),
            record_type: GATEWAY_RECORD_TYPE.to_string(),
            version,
            name: name.into(),
            description: description.into(),
            config,
            status: STATUS_DEPLOYED.to_string(),
            create_user: user.to_string(),
            create_time: now,
            update_user: user.to_string(),
            update_time: now,
        }
    }

    /// Copy of this record carrying new content and fresh update audit fields.
    ///
    /// Identity and creation audit fields are preserved.
    pub fn revised(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        config: String,
        user: &str,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            config,
            status: STATUS_DEPLOYED.to_string(),
            update_user: user.to_string(),
            update_time: now_nanos(),
            ..self.clone()
        }
    }
}

/// Current time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}
