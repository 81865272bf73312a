//! Remote server transport.
//!
//! A [`RemoteTransport`] knows how to talk to one external capability server:
//! fetch its catalog and invoke a capability on it. The production transport
//! speaks JSON-RPC 2.0 over HTTP; tests substitute an in-memory one.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AggregatorError;
use crate::registry::types::{CapabilityKind, ExternalServer};

/// One catalog entry as reported by a remote server, before namespacing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCapability {
    pub name: String,
    pub kind: CapabilityKind,
    #[serde(default)]
    pub description: String,
    /// Input schema for tools, template metadata for prompts, descriptor for
    /// resources. Carried verbatim into the registry.
    #[serde(default)]
    pub schema_or_content: Value,
}

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetch the server's full catalog. One attempt; the caller decides what
    /// an unreachable server means.
    async fn list_capabilities(
        &self,
        server: &ExternalServer,
    ) -> Result<Vec<RemoteCapability>, AggregatorError>;

    /// Invoke one capability by its original (un-namespaced) name.
    async fn invoke(
        &self,
        server: &ExternalServer,
        kind: CapabilityKind,
        original_name: &str,
        arguments: &Value,
    ) -> Result<Value, AggregatorError>;
}

// ==================== HTTP JSON-RPC transport ====================

/// How an HTTP server's `transport_config` is interpreted.
#[derive(Debug, Clone, Deserialize)]
struct HttpEndpoint {
    endpoint: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct HttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpTransport {
    pub fn new(default_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("capgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            default_timeout,
        }
    }

    fn endpoint(server: &ExternalServer) -> Result<HttpEndpoint, AggregatorError> {
        serde_json::from_value(server.transport_config.clone()).map_err(|e| {
            AggregatorError::Transport(format!(
                "server '{}' has an invalid transport config: {}",
                server.slug, e
            ))
        })
    }

    async fn call(
        &self,
        server: &ExternalServer,
        method: &str,
        params: Value,
    ) -> Result<Value, AggregatorError> {
        let endpoint = Self::endpoint(server)?;
        let timeout = endpoint
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let mut builder = self
            .client
            .post(&endpoint.endpoint)
            .timeout(timeout)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id: 1,
                method,
                params,
            });
        for (name, value) in &endpoint.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AggregatorError::Timeout(timeout)
            } else {
                AggregatorError::Transport(e.to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(AggregatorError::Transport(format!(
                "server '{}' returned status {}",
                server.slug,
                response.status()
            )));
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| AggregatorError::Transport(format!("malformed response: {}", e)))?;
        if let Some(err) = rpc.error {
            return Err(AggregatorError::Remote(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }
        rpc.result
            .ok_or_else(|| AggregatorError::Transport("response with neither result nor error".to_string()))
    }
}

fn list_method(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => "tools/list",
        CapabilityKind::Prompt => "prompts/list",
        CapabilityKind::Resource => "resources/list",
    }
}

fn invoke_method(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => "tools/call",
        CapabilityKind::Prompt => "prompts/get",
        CapabilityKind::Resource => "resources/read",
    }
}

fn catalog_key(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => "tools",
        CapabilityKind::Prompt => "prompts",
        CapabilityKind::Resource => "resources",
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn list_capabilities(
        &self,
        server: &ExternalServer,
    ) -> Result<Vec<RemoteCapability>, AggregatorError> {
        // The three catalogs are independent; fetch them concurrently.
        let (tools, prompts, resources) = futures::try_join!(
            self.call(server, list_method(CapabilityKind::Tool), serde_json::json!({})),
            self.call(server, list_method(CapabilityKind::Prompt), serde_json::json!({})),
            self.call(server, list_method(CapabilityKind::Resource), serde_json::json!({})),
        )?;

        let mut catalog = Vec::new();
        for (kind, result) in [
            (CapabilityKind::Tool, tools),
            (CapabilityKind::Prompt, prompts),
            (CapabilityKind::Resource, resources),
        ] {
            let entries = result
                .get(catalog_key(kind))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in entries {
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AggregatorError::Transport(format!(
                            "unnamed {} in catalog from '{}'",
                            kind, server.slug
                        ))
                    })?
                    .to_string();
                let description = entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let schema_or_content = match kind {
                    CapabilityKind::Tool => entry
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or(Value::Object(Default::default())),
                    _ => entry.clone(),
                };
                catalog.push(RemoteCapability {
                    name,
                    kind,
                    description,
                    schema_or_content,
                });
            }
        }
        Ok(catalog)
    }

    async fn invoke(
        &self,
        server: &ExternalServer,
        kind: CapabilityKind,
        original_name: &str,
        arguments: &Value,
    ) -> Result<Value, AggregatorError> {
        let params = match kind {
            CapabilityKind::Resource => serde_json::json!({ "uri": original_name }),
            _ => serde_json::json!({ "name": original_name, "arguments": arguments }),
        };
        self.call(server, invoke_method(kind), params).await
    }
}
