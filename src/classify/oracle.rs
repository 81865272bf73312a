//! Classification oracle: the LLM consulted to map a capability onto the
//! skill catalog.
//!
//! The engine makes exactly one oracle call per classification. The oracle
//! either returns confidence-scored matches against the provided catalog or
//! proposes a new skill when nothing fits.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::registry::types::SkillCategory;

/// One scored match from the oracle.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleAssignment {
    pub skill_id: String,
    pub confidence: f64,
}

/// A proposal for a skill category that does not exist yet.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleSuggestion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reasoning: String,
}

/// What the oracle decided.
#[derive(Debug, Clone)]
pub enum OracleVerdict {
    /// Scored matches against the existing catalog (possibly empty).
    Assignments(Vec<OracleAssignment>),
    /// Nothing fits; a new skill is proposed instead.
    Suggestion(OracleSuggestion),
}

/// The seam between the classification engine and the LLM.
#[async_trait]
pub trait ClassifyOracle: Send + Sync {
    async fn classify(
        &self,
        name: &str,
        description: &str,
        catalog: &[SkillCategory],
    ) -> Result<OracleVerdict, ClassifyError>;
}

// ==================== OpenAI-compatible implementation ====================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Wire shape the oracle prompt asks the model to produce.
#[derive(Debug, Deserialize)]
struct OracleReply {
    #[serde(default)]
    assignments: Vec<OracleAssignment>,
    #[serde(default)]
    suggestion: Option<OracleSuggestion>,
}

const SYSTEM_PROMPT: &str = "\
You categorize agent capabilities into skill categories. You are given a \
capability's name and description and a catalog of existing skills. Reply \
with JSON only. If one or more catalog skills plausibly cover the \
capability, reply {\"assignments\": [{\"skill_id\": \"...\", \"confidence\": 0.0-1.0}, ...]} \
using only skill_id values from the catalog. If nothing in the catalog \
fits, reply {\"suggestion\": {\"name\": \"...\", \"description\": \"...\", \
\"reasoning\": \"...\"}} proposing one new skill.";

/// Oracle backed by an OpenAI-compatible chat completion endpoint.
pub struct ChatOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl ChatOracle {
    pub fn new(config: &ClassifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.oracle_timeout)
            .user_agent(concat!("capgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.oracle_base_url.trim_end_matches('/').to_string(),
            api_key: config.oracle_api_key.clone(),
            model: config.oracle_model.clone(),
            timeout: config.oracle_timeout,
        }
    }

    fn user_prompt(name: &str, description: &str, catalog: &[SkillCategory]) -> String {
        let catalog_json: Vec<serde_json::Value> = catalog
            .iter()
            .map(|s| {
                serde_json::json!({
                    "skill_id": s.id,
                    "description": s.description,
                    "keywords": s.keywords,
                    "examples": s.examples,
                })
            })
            .collect();
        format!(
            "Capability name: {}\nCapability description: {}\n\nSkill catalog:\n{}",
            name,
            description,
            serde_json::Value::Array(catalog_json)
        )
    }
}

#[async_trait]
impl ClassifyOracle for ChatOracle {
    async fn classify(
        &self,
        name: &str,
        description: &str,
        catalog: &[SkillCategory],
    ) -> Result<OracleVerdict, ClassifyError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::user_prompt(name, description, catalog),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassifyError::Timeout(self.timeout)
            } else {
                ClassifyError::Oracle(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ClassifyError::Oracle(format!(
                "oracle returned status {}",
                response.status()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::BadResponse(e.to_string()))?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ClassifyError::BadResponse("empty choices".to_string()))?;

        parse_reply(content)
    }
}

/// Parse the oracle's JSON reply into a verdict.
fn parse_reply(content: &str) -> Result<OracleVerdict, ClassifyError> {
    let reply: OracleReply = serde_json::from_str(content)
        .map_err(|e| ClassifyError::BadResponse(format!("{}: {:?}", e, content)))?;

    if let Some(suggestion) = reply.suggestion {
        if reply.assignments.is_empty() {
            return Ok(OracleVerdict::Suggestion(suggestion));
        }
        // A reply carrying both is treated as assignments; the suggestion
        // would only duplicate a catalog entry the model also matched.
    }
    Ok(OracleVerdict::Assignments(reply.assignments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignments() {
        let verdict = parse_reply(
            r#"{"assignments":[{"skill_id":"web-search","confidence":0.9},
                               {"skill_id":"scraping","confidence":0.4}]}"#,
        )
        .unwrap();
        match verdict {
            OracleVerdict::Assignments(a) => {
                assert_eq!(a.len(), 2);
                assert_eq!(a[0].skill_id, "web-search");
            }
            _ => panic!("expected assignments"),
        }
    }

    #[test]
    fn parses_suggestion() {
        let verdict = parse_reply(
            r#"{"suggestion":{"name":"Video Editing","description":"Cut and splice","reasoning":"No media skills exist"}}"#,
        )
        .unwrap();
        match verdict {
            OracleVerdict::Suggestion(s) => assert_eq!(s.name, "Video Editing"),
            _ => panic!("expected suggestion"),
        }
    }

    #[test]
    fn assignments_win_when_both_present() {
        let verdict = parse_reply(
            r#"{"assignments":[{"skill_id":"a","confidence":0.8}],
                "suggestion":{"name":"b"}}"#,
        )
        .unwrap();
        assert!(matches!(verdict, OracleVerdict::Assignments(_)));
    }

    #[test]
    fn garbage_is_bad_response() {
        assert!(matches!(
            parse_reply("I think it's a search tool"),
            Err(ClassifyError::BadResponse(_))
        ));
    }
}
