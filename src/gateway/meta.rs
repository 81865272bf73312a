//! The fixed meta-tool surface.
//!
//! Agents see only these few tools up front; everything else in the registry
//! is reached through them. Seeded as default capabilities at startup so
//! they appear in every scope's listings, and kept out of classification.

use serde_json::json;

use crate::error::StoreError;
use crate::registry::types::NewCapability;
use crate::registry::CapabilityRegistry;
use crate::tenant::TenantScope;

/// Names of the meta-tools, in the order they are presented to agents.
pub const META_TOOL_NAMES: &[&str] = &[
    "discover",
    "get_tool_schema",
    "execute",
    "list_skills",
    "list_prompts",
    "get_prompt",
    "list_resources",
    "read_resource",
];

fn definitions() -> Vec<NewCapability> {
    vec![
        NewCapability::global_tool(
            "discover",
            "Search the capability registry for tools relevant to a task. \
             Returns ranked summaries; use get_tool_schema for full definitions.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What you are trying to do"
                    },
                    "skill": {
                        "type": "string",
                        "description": "Optional skill category slug to filter by"
                    },
                    "kind": {
                        "type": "string",
                        "enum": ["tool", "prompt", "resource"],
                        "description": "Optional capability kind to filter by"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Cap on returned summaries"
                    }
                },
                "required": ["query"]
            }),
        )
        .as_default(),
        NewCapability::global_tool(
            "get_tool_schema",
            "Fetch the full definition and input schema of one tool by name.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Tool name from discover" }
                },
                "required": ["name"]
            }),
        )
        .as_default(),
        NewCapability::global_tool(
            "execute",
            "Invoke a registered tool by name with JSON arguments.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Tool name" },
                    "arguments": {
                        "type": "object",
                        "description": "Arguments matching the tool's input schema"
                    }
                },
                "required": ["name"]
            }),
        )
        .as_default(),
        NewCapability::global_tool(
            "list_skills",
            "List the skill categories capabilities are grouped under.",
            json!({ "type": "object", "properties": {} }),
        )
        .as_default(),
        NewCapability::global_tool(
            "list_prompts",
            "List available prompt templates, optionally filtered by skill.",
            json!({
                "type": "object",
                "properties": {
                    "skill": { "type": "string", "description": "Optional skill slug" }
                }
            }),
        )
        .as_default(),
        NewCapability::global_tool(
            "get_prompt",
            "Fetch one prompt template by name.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Prompt name" }
                },
                "required": ["name"]
            }),
        )
        .as_default(),
        NewCapability::global_tool(
            "list_resources",
            "List available resources, optionally filtered by skill.",
            json!({
                "type": "object",
                "properties": {
                    "skill": { "type": "string", "description": "Optional skill slug" }
                }
            }),
        )
        .as_default(),
        NewCapability::global_tool(
            "read_resource",
            "Read one resource by name.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Resource name" }
                },
                "required": ["name"]
            }),
        )
        .as_default(),
    ]
}

/// Idempotently register the meta-tools. Safe to call on every startup.
pub async fn seed_defaults(registry: &CapabilityRegistry) -> Result<usize, StoreError> {
    let scope = TenantScope::global();
    let mut seeded = 0;
    for definition in definitions() {
        let existing = registry
            .store()
            .get_capability_by_name(&definition.name, &scope)
            .await?;
        if existing.is_some() {
            continue;
        }
        registry.register(definition).await?;
        seeded += 1;
    }
    Ok(seeded)
}
