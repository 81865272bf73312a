//! Domain types shared by the store, classifier, gateway, and aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of callable a capability is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Prompt,
    Resource,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Prompt => "prompt",
            Self::Resource => "resource",
        }
    }
}

impl std::str::FromStr for CapabilityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool" => Ok(Self::Tool),
            "prompt" => Ok(Self::Prompt),
            "resource" => Ok(Self::Resource),
            other => Err(format!("unknown capability kind '{}'", other)),
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage counters mutated by the gateway after every execute attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    pub call_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    /// Running average latency in milliseconds across all calls.
    pub avg_latency_ms: f64,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A registered capability: tool, prompt, or resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: Uuid,
    /// Display/invocation name. Namespaced (`"{server-slug}.{original}"`)
    /// for imported capabilities.
    pub name: String,
    /// Name on the origin server, before namespacing. Only set when external.
    pub original_name: Option<String>,
    pub kind: CapabilityKind,
    pub description: String,
    /// Owning external server, if imported. Non-null iff external.
    pub source_server_id: Option<Uuid>,
    /// Tool input schema, prompt template+arguments, or resource descriptor.
    /// Opaque to the registry beyond execute-time argument validation.
    pub schema_or_content: serde_json::Value,
    pub skill_ids: Vec<String>,
    pub primary_skill_id: Option<String>,
    pub is_classified: bool,
    /// Owning org. `None` together with `is_global` means visible everywhere.
    pub org_id: Option<String>,
    pub is_global: bool,
    /// True for the fixed meta-tools always exposed outside discovery.
    pub is_default: bool,
    pub is_active: bool,
    pub is_deprecated: bool,
    pub usage: UsageCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Capability {
    pub fn is_external(&self) -> bool {
        self.source_server_id.is_some()
    }
}

/// Input for registering a capability. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewCapability {
    pub name: String,
    pub original_name: Option<String>,
    pub kind: CapabilityKind,
    pub description: String,
    pub source_server_id: Option<Uuid>,
    pub schema_or_content: serde_json::Value,
    pub org_id: Option<String>,
    pub is_global: bool,
    pub is_default: bool,
}

impl NewCapability {
    /// A global tool with the given name, description, and input schema.
    pub fn global_tool(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            original_name: None,
            kind: CapabilityKind::Tool,
            description: description.into(),
            source_server_id: None,
            schema_or_content: schema,
            org_id: None,
            is_global: true,
            is_default: false,
        }
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self.is_global = false;
        self
    }

    pub fn with_kind(mut self, kind: CapabilityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// A skill category used to group capabilities for discovery filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillCategory {
    /// Short slug, e.g. "web-search".
    pub id: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub examples: Vec<String>,
    pub parent_domain: Option<String>,
    /// Denormalized count of assignments referencing this category.
    /// Maintained transactionally with every assignment change.
    pub tool_count: i64,
    pub is_active: bool,
    /// Catalog insertion order; drives the deterministic classification
    /// tie-break (oldest skill wins on equal confidence).
    pub created_at: DateTime<Utc>,
}

/// Who produced a skill assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// Written by the classification engine.
    Auto,
    /// Assigned directly by a human.
    HumanManual,
    /// A human override of an automatic assignment. Permanent until another
    /// human override; reclassification must not touch it.
    HumanOverride,
}

impl AssignmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::HumanManual => "human_manual",
            Self::HumanOverride => "human_override",
        }
    }

    pub fn is_human(&self) -> bool {
        !matches!(self, Self::Auto)
    }
}

impl std::str::FromStr for AssignmentSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "human_manual" => Ok(Self::HumanManual),
            "human_override" => Ok(Self::HumanOverride),
            other => Err(format!("unknown assignment source '{}'", other)),
        }
    }
}

/// A capability-to-skill assignment with its confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillAssignment {
    pub capability_id: Uuid,
    pub skill_id: String,
    /// Oracle confidence in [0, 1]. Human assignments carry 1.0.
    pub confidence: f64,
    pub is_primary: bool,
    pub source: AssignmentSource,
    pub assigned_at: DateTime<Utc>,
}

/// Lifecycle of a skill suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
    Merged,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Merged => "merged",
        }
    }
}

impl std::str::FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "merged" => Ok(Self::Merged),
            other => Err(format!("unknown suggestion status '{}'", other)),
        }
    }
}

/// A pending proposal for a skill category that does not exist yet.
///
/// Created only by the classification engine when nothing in the catalog
/// clears the confidence threshold; resolved only by a human reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSuggestion {
    pub id: Uuid,
    pub suggested_name: String,
    pub suggested_description: String,
    pub source_capability_id: Uuid,
    pub reasoning: String,
    pub status: SuggestionStatus,
    pub merged_into_skill_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Health of an external server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Connected,
    /// Unreachable at last import/resync; last-known capability snapshot is
    /// retained so agents keep visibility, but execute fails fast.
    Degraded,
    Disconnected,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::str::FromStr for ServerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "degraded" => Ok(Self::Degraded),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(format!("unknown server status '{}'", other)),
        }
    }
}

/// A registered remote capability server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServer {
    pub id: Uuid,
    /// Short identifier used as the namespace prefix for imported names.
    pub slug: String,
    /// Transport descriptor (endpoint URL, headers, etc.). Opaque to the
    /// store; interpreted by the aggregator's transport layer.
    pub transport_config: serde_json::Value,
    pub status: ServerStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Compact summary returned by `discover`. Never carries a full schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySummary {
    pub name: String,
    pub kind: CapabilityKind,
    pub brief_description: String,
    pub primary_skill: Option<String>,
}
