//! Instances domain module.
//!
//! Lifecycle of gateway instances: the in-memory registry of live instances,
//! the manager that builds and tears them down, and the orchestration service
//! that keeps them in step with the record store.
//!
//! ## Architecture
//!
//! - `model.rs` - Instance identity, configuration and request/response types
//! - `registry.rs` - Live-instance registry
//! - `manager.rs` - Construction and teardown of runtime instances
//! - `service.rs` - Transactional create/update/delete/upgrade and startup replay
//! - `error.rs` - Instance error types

mod error;
mod manager;
mod model;
mod registry;
mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{InstanceError, InstanceResult};
pub use manager::InstanceManager;
pub use model::{
    CreateInstanceRequest, CreateInstanceResponse, InstanceConfig, InstanceInfo, InstanceKey,
    RuntimeInstance, ToolDeclaration, UpdateInstanceRequest, UpdateInstanceResponse,
};
pub use registry::InstanceStorage;
pub use service::OrchestrationService;
