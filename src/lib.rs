//! Capability gateway for LLM agents.
//!
//! Instead of exposing hundreds of tool definitions up front, agents get a
//! fixed handful of meta-tools backed by a persistent registry: `discover`
//! searches it, `get_tool_schema` expands one entry, `execute` dispatches
//! locally or proxies to the external server a capability was imported from.
//! A background engine classifies every capability into a skill taxonomy the
//! moment it registers, and never blocks registration or discovery on it.

pub mod aggregator;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod rpc;
pub mod store;
pub mod tenant;
#[cfg(test)]
pub(crate) mod testing;
pub mod tools;

pub use aggregator::Aggregator;
pub use classify::{Classifier, ClassifyWorker};
pub use error::{AggregatorError, ClassifyError, ConfigError, GatewayError, StoreError};
pub use gateway::Gateway;
pub use registry::CapabilityRegistry;
pub use store::Store;
pub use tenant::TenantScope;
