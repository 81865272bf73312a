//! The discovery and execution gateway.
//!
//! This is the surface agents talk to: a handful of meta-tools instead of
//! hundreds of individual ones. `discover` searches the registry and returns
//! compact summaries, `get_tool_schema` expands one of them, `execute`
//! dispatches to a local handler or proxies to the owning external server.
//! Prompts and resources get the same treatment with their own verbs.

pub mod meta;
pub mod ranking;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::registry::types::{Capability, CapabilityKind, CapabilitySummary, SkillCategory};
use crate::store::Store;
use crate::tenant::TenantScope;
use crate::tools::{schema_lint, LocalToolSet};

pub use meta::seed_defaults;

const BRIEF_DESCRIPTION_CHARS: usize = 160;

pub struct Gateway {
    store: Arc<dyn Store>,
    aggregator: Arc<Aggregator>,
    local_tools: Arc<LocalToolSet>,
    max_results: usize,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn Store>,
        aggregator: Arc<Aggregator>,
        local_tools: Arc<LocalToolSet>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            local_tools,
            max_results: config.max_results,
        }
    }

    /// Search the scope's visible capabilities for matches to a free-text
    /// query. Returns ranked summaries, never full schemas; the meta-tools
    /// themselves are excluded since they are always exposed anyway.
    pub async fn discover(
        &self,
        scope: &TenantScope,
        query: &str,
        kind: Option<CapabilityKind>,
        skill: Option<&str>,
        max_results: Option<usize>,
    ) -> Result<Vec<CapabilitySummary>, GatewayError> {
        let candidates = self.store.list_visible(scope, kind, skill).await?;
        let candidates: Vec<Capability> =
            candidates.into_iter().filter(|c| !c.is_default).collect();
        let skills = self.store.list_skills(true).await?;

        let max = max_results.unwrap_or(self.max_results);
        let ranked = ranking::rank(query, &candidates, &skills, max);
        debug!(
            scope = %scope,
            query = %query,
            candidates = candidates.len(),
            returned = ranked.len(),
            "discover"
        );
        Ok(ranked.iter().map(|c| summarize(c)).collect())
    }

    /// Full definition of one tool, fetched by name after discovery.
    pub async fn get_tool_schema(
        &self,
        scope: &TenantScope,
        name: &str,
    ) -> Result<Value, GatewayError> {
        let capability = self.resolve(scope, name, CapabilityKind::Tool).await?;
        Ok(serde_json::json!({
            "name": capability.name,
            "description": capability.description,
            "input_schema": capability.schema_or_content,
            "skills": capability.skill_ids,
            "primary_skill": capability.primary_skill_id,
            "deprecated": capability.is_deprecated,
        }))
    }

    /// Invoke a tool by name. Arguments are validated against the stored
    /// schema before any handler or network is touched; the outcome, either
    /// way, is folded into the capability's usage counters.
    pub async fn execute(
        &self,
        scope: &TenantScope,
        name: &str,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        let capability = self.resolve(scope, name, CapabilityKind::Tool).await?;

        let violations = schema_lint::validate_arguments(&capability.schema_or_content, &arguments);
        if !violations.is_empty() {
            return Err(GatewayError::InvalidArguments(violations.join("; ")));
        }

        let started = Instant::now();
        let result = self.dispatch(&capability, &arguments).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self
            .store
            .record_usage(capability.id, result.is_ok(), latency_ms)
            .await
        {
            // Usage accounting must not mask the actual outcome.
            warn!(name = %capability.name, "failed to record usage: {e}");
        }
        result
    }

    pub async fn list_skills(&self) -> Result<Vec<SkillCategory>, GatewayError> {
        Ok(self.store.list_skills(true).await?)
    }

    /// Summaries of every prompt visible to the scope, optionally filtered
    /// by skill.
    pub async fn list_prompts(
        &self,
        scope: &TenantScope,
        skill: Option<&str>,
    ) -> Result<Vec<CapabilitySummary>, GatewayError> {
        self.list_kind(scope, CapabilityKind::Prompt, skill).await
    }

    /// Fetch one prompt. Local prompts return their stored template;
    /// external ones are rendered by the owning server.
    pub async fn get_prompt(
        &self,
        scope: &TenantScope,
        name: &str,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        let capability = self.resolve(scope, name, CapabilityKind::Prompt).await?;
        self.deliver(&capability, arguments).await
    }

    pub async fn list_resources(
        &self,
        scope: &TenantScope,
        skill: Option<&str>,
    ) -> Result<Vec<CapabilitySummary>, GatewayError> {
        self.list_kind(scope, CapabilityKind::Resource, skill).await
    }

    /// Read one resource, locally stored or proxied.
    pub async fn read_resource(
        &self,
        scope: &TenantScope,
        name: &str,
    ) -> Result<Value, GatewayError> {
        let capability = self.resolve(scope, name, CapabilityKind::Resource).await?;
        self.deliver(&capability, Value::Object(Default::default()))
            .await
    }

    async fn list_kind(
        &self,
        scope: &TenantScope,
        kind: CapabilityKind,
        skill: Option<&str>,
    ) -> Result<Vec<CapabilitySummary>, GatewayError> {
        let capabilities = self.store.list_visible(scope, Some(kind), skill).await?;
        Ok(capabilities
            .iter()
            .filter(|c| !c.is_default)
            .map(summarize)
            .collect())
    }

    /// Resolve a name in the caller's scope, insisting on the expected kind.
    ///
    /// Everything that does not resolve to a usable capability of that kind
    /// comes back as the same opaque `NotFound`: a name that never existed,
    /// one owned by another org, one that is inactive, and one of a
    /// different kind are indistinguishable to the caller.
    async fn resolve(
        &self,
        scope: &TenantScope,
        name: &str,
        kind: CapabilityKind,
    ) -> Result<Capability, GatewayError> {
        let capability = self
            .store
            .get_capability_by_name(name, scope)
            .await?
            .filter(|c| c.kind == kind)
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))?;
        Ok(capability)
    }

    async fn dispatch(
        &self,
        capability: &Capability,
        arguments: &Value,
    ) -> Result<Value, GatewayError> {
        if capability.is_external() {
            return Ok(self.aggregator.invoke(capability, arguments).await?);
        }
        let tool = self.local_tools.get(&capability.name).ok_or_else(|| {
            GatewayError::ExecutionFailed(format!(
                "no local handler registered for '{}'",
                capability.name
            ))
        })?;
        let timeout = tool.execution_timeout();
        match tokio::time::timeout(timeout, tool.invoke(arguments.clone())).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout)),
        }
    }

    /// Prompt/resource delivery: local content straight from the registry,
    /// external content through the aggregator. Reads count as usage.
    async fn deliver(
        &self,
        capability: &Capability,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        let started = Instant::now();
        let result = if capability.is_external() {
            self.aggregator
                .invoke(capability, &arguments)
                .await
                .map_err(GatewayError::from)
        } else {
            Ok(capability.schema_or_content.clone())
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Err(e) = self
            .store
            .record_usage(capability.id, result.is_ok(), latency_ms)
            .await
        {
            warn!(name = %capability.name, "failed to record usage: {e}");
        }
        result
    }
}

fn summarize(capability: &Capability) -> CapabilitySummary {
    CapabilitySummary {
        name: capability.name.clone(),
        kind: capability.kind,
        brief_description: brief(&capability.description),
        primary_skill: capability.primary_skill_id.clone(),
    }
}

fn brief(description: &str) -> String {
    if description.chars().count() <= BRIEF_DESCRIPTION_CHARS {
        return description.to_string();
    }
    let truncated: String = description.chars().take(BRIEF_DESCRIPTION_CHARS - 1).collect();
    format!("{}…", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::aggregator::testing::FakeTransport;
    use crate::aggregator::RemoteTransport;
    use crate::config::AggregatorConfig;
    use crate::registry::types::NewCapability;
    use crate::registry::CapabilityRegistry;
    use crate::tools::LocalTool;

    struct SlowTool;

    #[async_trait]
    impl LocalTool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        fn parameters_schema(&self) -> Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }

        async fn invoke(&self, _args: Value) -> Result<Value, GatewayError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Value::Null)
        }

        fn execution_timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
    }

    async fn setup() -> (Arc<dyn Store>, Arc<FakeTransport>, Gateway, tempfile::TempDir) {
        let (store, dir) = crate::testing::test_store().await;
        let transport = Arc::new(FakeTransport::default());
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn RemoteTransport>,
            &AggregatorConfig::default(),
        ));
        let mut tools = LocalToolSet::with_builtins().unwrap();
        tools.register(Arc::new(SlowTool)).unwrap();
        let gateway = Gateway::new(
            Arc::clone(&store),
            aggregator,
            Arc::new(tools),
            &GatewayConfig::default(),
        );
        (store, transport, gateway, dir)
    }

    async fn register_tool(store: &Arc<dyn Store>, new: NewCapability) {
        store.register_capability(&new).await.unwrap();
    }

    #[tokio::test]
    async fn discover_returns_summaries_not_schemas() {
        let (store, _, gateway, _dir) = setup().await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "echo",
                "Echo the supplied message back",
                serde_json::json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
            ),
        )
        .await;

        let scope = TenantScope::global();
        let results = gateway
            .discover(&scope, "echo a message", None, None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "echo");
        // Summary carries no schema; that requires get_tool_schema.
        let schema = gateway.get_tool_schema(&scope, "echo").await.unwrap();
        assert!(schema["input_schema"]["properties"]["message"].is_object());
    }

    #[tokio::test]
    async fn meta_tools_do_not_appear_in_discovery() {
        let (store, _, gateway, _dir) = setup().await;
        let registry = CapabilityRegistry::new(Arc::clone(&store));
        meta::seed_defaults(&registry).await.unwrap();

        let scope = TenantScope::global();
        let results = gateway
            .discover(&scope, "discover execute schema", None, None, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn execute_validates_arguments_before_dispatch() {
        let (store, _, gateway, _dir) = setup().await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "echo",
                "Echo the supplied message back",
                serde_json::json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
            ),
        )
        .await;

        let scope = TenantScope::global();
        let err = gateway
            .execute(&scope, "echo", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArguments(_)));

        // A failed validation never reaches the handler or the counters.
        let cap = store
            .get_capability_by_name("echo", &scope)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cap.usage.call_count, 0);
    }

    #[tokio::test]
    async fn execute_runs_local_tools_and_records_usage() {
        let (store, _, gateway, _dir) = setup().await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "echo",
                "Echo the supplied message back",
                serde_json::json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
            ),
        )
        .await;

        let scope = TenantScope::global();
        let out = gateway
            .execute(&scope, "echo", serde_json::json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(out["message"], "hi");

        let cap = store
            .get_capability_by_name("echo", &scope)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cap.usage.call_count, 1);
        assert_eq!(cap.usage.success_count, 1);
    }

    #[tokio::test]
    async fn execute_times_out_slow_local_tools() {
        let (store, _, gateway, _dir) = setup().await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "slow",
                "Never finishes in time",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
        )
        .await;

        let scope = TenantScope::global();
        let err = gateway
            .execute(&scope, "slow", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));

        // The timeout still counts as a (failed) call.
        let cap = store
            .get_capability_by_name("slow", &scope)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cap.usage.failure_count, 1);
    }

    #[tokio::test]
    async fn execute_proxies_external_tools() {
        let (store, transport, gateway, _dir) = setup().await;
        let aggregator = Aggregator::new(
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn RemoteTransport>,
            &AggregatorConfig::default(),
        );

        transport.set_catalog("hub", vec![FakeTransport::tool("greet", "Say hello")]);
        transport.responses.lock().unwrap().insert(
            "greet".to_string(),
            serde_json::json!({"content": "hello"}),
        );
        aggregator
            .add_server("hub", serde_json::json!({"endpoint": "http://x/rpc"}))
            .await
            .unwrap();

        let scope = TenantScope::global();
        let out = gateway
            .execute(&scope, "hub.greet", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out["content"], "hello");
    }

    #[tokio::test]
    async fn cross_tenant_resolution_is_opaque() {
        let (store, _, gateway, _dir) = setup().await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "private_tool",
                "Belongs to acme",
                serde_json::json!({ "type": "object", "properties": {} }),
            )
            .with_org("acme"),
        )
        .await;

        let other = TenantScope::org("globex");
        let missing = gateway
            .execute(&other, "no_such_tool", serde_json::json!({}))
            .await
            .unwrap_err();
        let foreign = gateway
            .execute(&other, "private_tool", serde_json::json!({}))
            .await
            .unwrap_err();
        // Same shape either way; the caller cannot probe other tenants.
        assert_eq!(missing.to_string().replace("no_such_tool", "x"),
                   foreign.to_string().replace("private_tool", "x"));
        assert!(matches!(foreign, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn wrong_kind_resolves_to_not_found() {
        let (store, _, gateway, _dir) = setup().await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "style_guide",
                "House writing style",
                serde_json::json!({"template": "Write like this: ..."}),
            )
            .with_kind(CapabilityKind::Prompt),
        )
        .await;

        let scope = TenantScope::global();
        let err = gateway
            .execute(&scope, "style_guide", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));

        // But it is reachable through the prompt verbs.
        let prompt = gateway
            .get_prompt(&scope, "style_guide", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(prompt["template"], "Write like this: ...");
    }

    #[tokio::test]
    async fn prompts_and_resources_list_by_kind() {
        let (store, _, gateway, _dir) = setup().await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "style_guide",
                "House writing style",
                serde_json::json!({"template": "..."}),
            )
            .with_kind(CapabilityKind::Prompt),
        )
        .await;
        register_tool(
            &store,
            NewCapability::global_tool(
                "glossary",
                "Terms used across the product",
                serde_json::json!({"uri": "internal://glossary"}),
            )
            .with_kind(CapabilityKind::Resource),
        )
        .await;

        let scope = TenantScope::global();
        let prompts = gateway.list_prompts(&scope, None).await.unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].name, "style_guide");

        let resources = gateway.list_resources(&scope, None).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "glossary");
    }

    #[test]
    fn brief_truncates_on_char_boundary() {
        let short = "Fits as is";
        assert_eq!(brief(short), short);
        let long = "x".repeat(400);
        let b = brief(&long);
        assert!(b.chars().count() <= BRIEF_DESCRIPTION_CHARS);
        assert!(b.ends_with('…'));
    }
}
