//! Local tool handlers.
//!
//! Capabilities without a `source_server_id` dispatch to a [`LocalTool`]
//! registered here. The trait is the seam the gateway invokes through; the
//! store holds the durable record, this set holds the behavior.

mod builtin;
pub mod schema_lint;

pub use builtin::{EchoTool, TimeTool};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;

/// A locally-implemented tool the gateway can dispatch to.
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// Invocation name. Must match the registered capability's name.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute with already-validated arguments.
    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, GatewayError>;

    /// Maximum time before the gateway abandons the call.
    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// The set of local tool handlers, keyed by name.
#[derive(Default)]
pub struct LocalToolSet {
    tools: HashMap<String, Arc<dyn LocalTool>>,
}

impl LocalToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Registration-time schema lint catches structural
    /// mistakes before an agent ever sees the tool.
    pub fn register(&mut self, tool: Arc<dyn LocalTool>) -> Result<(), GatewayError> {
        let errors = schema_lint::validate_tool_schema(&tool.parameters_schema(), tool.name());
        if !errors.is_empty() {
            return Err(GatewayError::InvalidArguments(format!(
                "tool '{}' has an invalid parameters schema: {}",
                tool.name(),
                errors.join("; ")
            )));
        }
        self.tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Iterate all registered handlers (used at startup to register their
    /// capability records).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn LocalTool>> {
        self.tools.values()
    }

    /// The standard built-ins.
    pub fn with_builtins() -> Result<Self, GatewayError> {
        let mut set = Self::new();
        set.register(Arc::new(EchoTool))?;
        set.register(Arc::new(TimeTool))?;
        Ok(set)
    }
}

/// Idempotently register a capability record for every local handler, so
/// the set's tools resolve by name through the gateway.
pub async fn seed_capabilities(
    set: &LocalToolSet,
    registry: &crate::registry::CapabilityRegistry,
) -> Result<usize, crate::error::StoreError> {
    let scope = crate::tenant::TenantScope::global();
    let mut seeded = 0;
    for tool in set.iter() {
        let existing = registry
            .store()
            .get_capability_by_name(tool.name(), &scope)
            .await?;
        if existing.is_some() {
            continue;
        }
        registry
            .register(crate::registry::types::NewCapability::global_tool(
                tool.name(),
                tool.description(),
                tool.parameters_schema(),
            ))
            .await?;
        seeded += 1;
    }
    Ok(seeded)
}

/// Extract a required string argument.
pub fn require_str<'a>(args: &'a serde_json::Value, name: &str) -> Result<&'a str, GatewayError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::InvalidArguments(format!("missing '{}' argument", name)))
}
