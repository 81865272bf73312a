//! Built-in local tools.

use async_trait::async_trait;
use chrono::Utc;

use super::{require_str, LocalTool};
use crate::error::GatewayError;

/// Echoes back the input message. Useful for wiring checks.
pub struct EchoTool;

#[async_trait]
impl LocalTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the input message. Useful for testing connectivity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        let message = require_str(&args, "message")?;
        Ok(serde_json::json!({ "message": message }))
    }
}

/// Returns the current UTC time.
pub struct TimeTool;

#[async_trait]
impl LocalTool for TimeTool {
    fn name(&self) -> &str {
        "time"
    }

    fn description(&self) -> &str {
        "Returns the current UTC date and time in RFC 3339 format."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, _args: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        Ok(serde_json::json!({
            "utc": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_round_trips() {
        let result = EchoTool
            .invoke(serde_json::json!({ "message": "hello" }))
            .await
            .unwrap();
        assert_eq!(result["message"], "hello");
    }

    #[tokio::test]
    async fn echo_rejects_missing_message() {
        let err = EchoTool.invoke(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn time_returns_rfc3339() {
        let result = TimeTool.invoke(serde_json::json!({})).await.unwrap();
        let text = result["utc"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok());
    }
}
