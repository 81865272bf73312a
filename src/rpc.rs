//! Stdio JSON-RPC surface.
//!
//! One request per line on stdin, one response per line on stdout. The
//! methods map one-to-one onto the gateway's meta-operations; an optional
//! `org` parameter selects the tenant scope, absent means global-only.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::GatewayError;
use crate::gateway::{meta, Gateway};
use crate::registry::types::CapabilityKind;
use crate::tenant::TenantScope;

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const NOT_FOUND: i64 = -32004;
const TIMEOUT: i64 = -32005;
const SERVER_UNAVAILABLE: i64 = -32010;
const INTERNAL: i64 = -32000;

/// Serve requests from stdin until it closes.
pub async fn serve_stdio(gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&gateway, &line).await;
        let mut bytes = serde_json::to_vec(&response)?;
        bytes.push(b'\n');
        out.write_all(&bytes).await?;
        out.flush().await?;
    }
    Ok(())
}

async fn handle_line(gateway: &Gateway, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return error_response(Value::Null, PARSE_ERROR, &e.to_string()),
    };
    handle(gateway, request).await
}

/// Dispatch one parsed JSON-RPC request.
pub async fn handle(gateway: &Gateway, request: Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = match request.get("method").and_then(Value::as_str) {
        Some(m) => m,
        None => return error_response(id, INVALID_PARAMS, "missing method"),
    };
    if !meta::META_TOOL_NAMES.contains(&method) {
        return error_response(id, METHOD_NOT_FOUND, &format!("unknown method '{method}'"));
    }
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
    debug!(method = %method, "rpc request");

    let scope = match params.get("org").and_then(Value::as_str) {
        Some(org) => TenantScope::org(org),
        None => TenantScope::global(),
    };

    let result = dispatch(gateway, method, &scope, &params).await;
    match result {
        Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
        Err(e) => {
            let code = match &e {
                GatewayError::NotFound(_) => NOT_FOUND,
                GatewayError::InvalidArguments(_) => INVALID_PARAMS,
                GatewayError::Timeout(_) => TIMEOUT,
                GatewayError::ServerUnavailable(_) => SERVER_UNAVAILABLE,
                _ => INTERNAL,
            };
            error_response(id, code, &e.to_string())
        }
    }
}

async fn dispatch(
    gateway: &Gateway,
    method: &str,
    scope: &TenantScope,
    params: &Value,
) -> Result<Value, GatewayError> {
    match method {
        "discover" => {
            let query = require_str(params, "query")?;
            let kind = match params.get("kind").and_then(Value::as_str) {
                Some(raw) => Some(
                    raw.parse::<CapabilityKind>()
                        .map_err(GatewayError::InvalidArguments)?,
                ),
                None => None,
            };
            let skill = params.get("skill").and_then(Value::as_str);
            let max = params
                .get("max_results")
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            let summaries = gateway.discover(scope, query, kind, skill, max).await?;
            Ok(serde_json::to_value(summaries).unwrap_or(Value::Null))
        }
        "get_tool_schema" => {
            let name = require_str(params, "name")?;
            gateway.get_tool_schema(scope, name).await
        }
        "execute" => {
            let name = require_str(params, "name")?;
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            gateway.execute(scope, name, arguments).await
        }
        "list_skills" => {
            let skills = gateway.list_skills().await?;
            Ok(serde_json::to_value(skills).unwrap_or(Value::Null))
        }
        "list_prompts" => {
            let skill = params.get("skill").and_then(Value::as_str);
            let prompts = gateway.list_prompts(scope, skill).await?;
            Ok(serde_json::to_value(prompts).unwrap_or(Value::Null))
        }
        "get_prompt" => {
            let name = require_str(params, "name")?;
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            gateway.get_prompt(scope, name, arguments).await
        }
        "list_resources" => {
            let skill = params.get("skill").and_then(Value::as_str);
            let resources = gateway.list_resources(scope, skill).await?;
            Ok(serde_json::to_value(resources).unwrap_or(Value::Null))
        }
        "read_resource" => {
            let name = require_str(params, "name")?;
            gateway.read_resource(scope, name).await
        }
        other => Err(GatewayError::InvalidArguments(format!(
            "unknown method '{other}'"
        ))),
    }
}

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, GatewayError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidArguments(format!("missing '{key}' parameter")))
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::testing::FakeTransport;
    use crate::aggregator::{Aggregator, RemoteTransport};
    use crate::config::{AggregatorConfig, GatewayConfig};
    use crate::registry::types::NewCapability;
    use crate::store::Store;
    use crate::tools::LocalToolSet;

    async fn gateway() -> (Arc<dyn Store>, Gateway, tempfile::TempDir) {
        let (store, dir) = crate::testing::test_store().await;
        let transport = Arc::new(FakeTransport::default());
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&store),
            transport as Arc<dyn RemoteTransport>,
            &AggregatorConfig::default(),
        ));
        let tools = Arc::new(LocalToolSet::with_builtins().unwrap());
        let gw = Gateway::new(
            Arc::clone(&store),
            aggregator,
            tools,
            &GatewayConfig::default(),
        );
        (store, gw, dir)
    }

    #[tokio::test]
    async fn execute_round_trip() {
        let (store, gw, _dir) = gateway().await;
        store
            .register_capability(&NewCapability::global_tool(
                "echo",
                "Echo the supplied message back",
                json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
            ))
            .await
            .unwrap();

        let response = handle(
            &gw,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "execute",
                "params": { "name": "echo", "arguments": { "message": "hi" } }
            }),
        )
        .await;
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"]["message"], "hi");
    }

    #[tokio::test]
    async fn unknown_name_maps_to_not_found_code() {
        let (_store, gw, _dir) = gateway().await;
        let response = handle(
            &gw,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "execute",
                "params": { "name": "missing" }
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_method_gets_method_not_found() {
        let (_store, gw, _dir) = gateway().await;
        let response = handle(
            &gw,
            json!({ "jsonrpc": "2.0", "id": 9, "method": "tools/list" }),
        )
        .await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_method_is_invalid() {
        let (_store, gw, _dir) = gateway().await;
        let response = handle(&gw, json!({ "jsonrpc": "2.0", "id": 2 })).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unparseable_line_is_a_parse_error() {
        let (_store, gw, _dir) = gateway().await;
        let response = handle_line(&gw, "not json at all").await;
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert!(response["id"].is_null());
    }

    #[tokio::test]
    async fn discover_over_rpc_returns_summaries() {
        let (store, gw, _dir) = gateway().await;
        store
            .register_capability(&NewCapability::global_tool(
                "web_search",
                "Search the public web",
                json!({ "type": "object", "properties": {} }),
            ))
            .await
            .unwrap();

        let response = handle(
            &gw,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "discover",
                "params": { "query": "search the web" }
            }),
        )
        .await;
        let results = response["result"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["name"], "web_search");
        assert!(results[0].get("input_schema").is_none());
    }
}
