//! Capability store abstraction.
//!
//! A backend-agnostic set of traits over transactional persistence for
//! capabilities, skill categories, assignments, suggestions, and external
//! servers. One implementation exists today, backed by libSQL (embedded
//! SQLite), with an in-memory constructor for tests.
//!
//! Two invariants are enforced here rather than by database triggers, so
//! they hold regardless of backend:
//!
//! - at most one assignment per capability has `is_primary = true`, and a
//!   primary change is an atomic swap inside one transaction;
//! - `skill_categories.tool_count` always equals the live count of
//!   assignments referencing the category, adjusted in the same transaction
//!   as every assignment change.

pub mod libsql_backend;
mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::registry::types::{
    Capability, CapabilityKind, ExternalServer, NewCapability, ServerStatus, SkillAssignment,
    SkillCategory, SkillSuggestion, SuggestionStatus,
};
use crate::tenant::TenantScope;

/// Open a store from configuration and apply the schema.
pub async fn connect_from_config(
    config: &crate::config::DatabaseConfig,
) -> Result<Arc<dyn Store>, StoreError> {
    let backend = libsql_backend::LibSqlStore::new_local(std::path::Path::new(&config.path)).await?;
    backend.apply_schema().await?;
    Ok(Arc::new(backend))
}

/// Persistence for capability records and their usage counters.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    /// Register a capability. Fails with [`StoreError::NameConflict`] when the
    /// name is already taken in its namespace (global, or the given org).
    /// Never overwrites; disambiguation is the caller's job.
    async fn register_capability(&self, new: &NewCapability) -> Result<Uuid, StoreError>;

    async fn get_capability(&self, id: Uuid) -> Result<Option<Capability>, StoreError>;

    /// Resolve a name within a caller's visible set. Org-scoped capabilities
    /// shadow same-named globals; defaults resolve like globals. Inactive
    /// capabilities never resolve.
    async fn get_capability_by_name(
        &self,
        name: &str,
        scope: &TenantScope,
    ) -> Result<Option<Capability>, StoreError>;

    /// All active capabilities visible to the scope, optionally filtered by
    /// kind and/or assigned skill.
    async fn list_visible(
        &self,
        scope: &TenantScope,
        kind: Option<CapabilityKind>,
        skill_id: Option<&str>,
    ) -> Result<Vec<Capability>, StoreError>;

    /// All capabilities owned by an external server, active or not.
    async fn list_for_server(&self, server_id: Uuid) -> Result<Vec<Capability>, StoreError>;

    /// Capabilities awaiting classification, oldest first.
    async fn list_unclassified(&self, limit: i64) -> Result<Vec<Capability>, StoreError>;

    async fn set_capability_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;

    /// Update the description and clear `is_classified` so the capability is
    /// picked up for reclassification.
    async fn update_description(&self, id: Uuid, description: &str) -> Result<(), StoreError>;

    /// Mark a capability classified without touching assignments. Used when a
    /// human resolves a suggestion and assigns skills directly.
    async fn mark_classified(&self, id: Uuid) -> Result<(), StoreError>;

    /// Delete a capability and its assignments, decrementing the affected
    /// skill categories' tool counts in the same transaction.
    async fn delete_capability(&self, id: Uuid) -> Result<(), StoreError>;

    /// Fold an execute outcome into the capability's usage counters.
    async fn record_usage(
        &self,
        id: Uuid,
        success: bool,
        latency_ms: f64,
    ) -> Result<(), StoreError>;
}

/// Persistence for skill categories, assignments, and suggestions.
#[async_trait]
pub trait SkillStore: Send + Sync {
    async fn create_skill(&self, skill: &SkillCategory) -> Result<(), StoreError>;

    async fn get_skill(&self, id: &str) -> Result<Option<SkillCategory>, StoreError>;

    /// Catalog in insertion order (the classification tie-break order).
    async fn list_skills(&self, active_only: bool) -> Result<Vec<SkillCategory>, StoreError>;

    /// Refuses with [`StoreError::SkillInUse`] while `tool_count > 0`.
    async fn deactivate_skill(&self, id: &str) -> Result<(), StoreError>;

    async fn list_assignments(
        &self,
        capability_id: Uuid,
    ) -> Result<Vec<SkillAssignment>, StoreError>;

    /// Insert or update a single assignment. When `is_primary` is set the old
    /// primary is unset in the same transaction (atomic swap); tool counts
    /// are adjusted for newly inserted rows.
    async fn upsert_assignment(&self, assignment: &SkillAssignment) -> Result<(), StoreError>;

    /// Commit a classification result: replace the capability's `Auto`
    /// assignments with `kept`, leave human rows untouched, set the primary
    /// to `primary` unless a human-override primary exists, and mark the
    /// capability classified. One transaction.
    async fn replace_auto_assignments(
        &self,
        capability_id: Uuid,
        kept: &[(String, f64)],
        primary: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Remove one assignment, maintaining counters and the denormalized
    /// primary in the same transaction.
    async fn remove_assignment(&self, capability_id: Uuid, skill_id: &str)
        -> Result<(), StoreError>;

    async fn create_suggestion(&self, suggestion: &SkillSuggestion) -> Result<(), StoreError>;

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<SkillSuggestion>, StoreError>;

    async fn list_suggestions(
        &self,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<SkillSuggestion>, StoreError>;

    /// Move a suggestion out of `Pending`. Terminal; fails if already resolved.
    async fn resolve_suggestion(
        &self,
        id: Uuid,
        status: SuggestionStatus,
        merged_into_skill_id: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Persistence for external server records.
#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn add_server(&self, server: &ExternalServer) -> Result<(), StoreError>;

    async fn get_server(&self, id: Uuid) -> Result<Option<ExternalServer>, StoreError>;

    async fn get_server_by_slug(&self, slug: &str) -> Result<Option<ExternalServer>, StoreError>;

    async fn list_servers(&self) -> Result<Vec<ExternalServer>, StoreError>;

    async fn set_server_status(
        &self,
        id: Uuid,
        status: ServerStatus,
        synced_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), StoreError>;

    /// Delete a server, its capabilities, and their assignments, adjusting
    /// the affected skill categories' tool counts. One transaction.
    async fn remove_server(&self, id: Uuid) -> Result<(), StoreError>;
}

/// The combined store consumed by the gateway, classifier, and aggregator.
pub trait Store: CapabilityStore + SkillStore + ServerStore {}

impl<T: CapabilityStore + SkillStore + ServerStore> Store for T {}
