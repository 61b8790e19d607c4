//! Domains module containing business logic organized by bounded contexts.
//!
//! - **instances**: gateway instance lifecycle and orchestration
//! - **records**: durable storage of instance configuration
//! - **tools**: declared tools and their downstream execution

pub mod instances;
pub mod records;
pub mod tools;
