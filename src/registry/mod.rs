//! Capability registry.
//!
//! The facade producers go through: package installers register batches,
//! the aggregator registers imported capabilities, admins review skill
//! suggestions and override assignments. The store rejects name conflicts;
//! disambiguation (numeric suffixing) happens here, on the producer side,
//! never inside the store.

pub mod types;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::registry::types::{
    AssignmentSource, NewCapability, SkillAssignment, SkillCategory, SkillSuggestion,
    SuggestionStatus,
};
use crate::store::Store;

/// How many suffixed variants to try before giving up on a name.
const MAX_NAME_ATTEMPTS: u32 = 20;

pub struct CapabilityRegistry {
    store: Arc<dyn Store>,
}

impl CapabilityRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Register exactly under the requested name. Conflicts surface to the
    /// caller unchanged.
    pub async fn register(&self, new: NewCapability) -> Result<Uuid, StoreError> {
        self.store.register_capability(&new).await
    }

    /// Register, appending a numeric suffix (`name-2`, `name-3`, ...) until
    /// the name is free in its namespace. Returns the id and the name that
    /// was actually used.
    pub async fn register_disambiguated(
        &self,
        new: NewCapability,
    ) -> Result<(Uuid, String), StoreError> {
        let base = new.name.clone();
        let mut candidate = new;
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            match self.store.register_capability(&candidate).await {
                Ok(id) => return Ok((id, candidate.name)),
                Err(StoreError::NameConflict { .. }) => {
                    candidate.name = format!("{}-{}", base, attempt + 1);
                    tracing::debug!(
                        name = %base,
                        retry = %candidate.name,
                        "Name taken, retrying with suffix"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::NameConflict { name: base })
    }

    /// Batch registration for package installers. Each item is
    /// disambiguated independently; one bad item fails the whole batch so
    /// installers never end up half-installed.
    pub async fn register_batch(
        &self,
        batch: Vec<NewCapability>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut ids = Vec::with_capacity(batch.len());
        for item in batch {
            let (id, _) = self.register_disambiguated(item).await?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Remove a batch of capabilities (package uninstall).
    pub async fn unregister_batch(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        for id in ids {
            self.store.delete_capability(*id).await?;
        }
        Ok(())
    }

    /// Human override of a skill assignment. Carries confidence 1.0 and is
    /// never reverted by automatic reclassification.
    pub async fn override_assignment(
        &self,
        capability_id: Uuid,
        skill_id: &str,
        is_primary: bool,
    ) -> Result<(), StoreError> {
        self.store
            .upsert_assignment(&SkillAssignment {
                capability_id,
                skill_id: skill_id.to_string(),
                confidence: 1.0,
                is_primary,
                source: AssignmentSource::HumanOverride,
                assigned_at: Utc::now(),
            })
            .await
    }

    /// Approve a suggestion: create the proposed skill category and classify
    /// the source capability into it as its primary skill.
    pub async fn approve_suggestion(&self, suggestion_id: Uuid) -> Result<String, StoreError> {
        let suggestion = self.require_pending(suggestion_id).await?;
        let slug = slugify(&suggestion.suggested_name);

        self.store
            .create_skill(&SkillCategory {
                id: slug.clone(),
                name: suggestion.suggested_name.clone(),
                description: suggestion.suggested_description.clone(),
                keywords: Vec::new(),
                examples: Vec::new(),
                parent_domain: None,
                tool_count: 0,
                is_active: true,
                created_at: Utc::now(),
            })
            .await?;

        self.store
            .resolve_suggestion(suggestion_id, SuggestionStatus::Approved, None)
            .await?;
        self.assign_from_review(suggestion.source_capability_id, &slug)
            .await?;
        Ok(slug)
    }

    /// Reject a suggestion. Terminal; the source capability stays
    /// unclassified and will be retried against the unchanged catalog only
    /// if something else triggers reclassification.
    pub async fn reject_suggestion(&self, suggestion_id: Uuid) -> Result<(), StoreError> {
        self.require_pending(suggestion_id).await?;
        self.store
            .resolve_suggestion(suggestion_id, SuggestionStatus::Rejected, None)
            .await
    }

    /// Merge a suggestion into an existing skill category, back-filling the
    /// source capability's assignment to point at the surviving category.
    pub async fn merge_suggestion(
        &self,
        suggestion_id: Uuid,
        into_skill_id: &str,
    ) -> Result<(), StoreError> {
        let suggestion = self.require_pending(suggestion_id).await?;
        if self.store.get_skill(into_skill_id).await?.is_none() {
            return Err(StoreError::RowNotFound(format!("skill '{}'", into_skill_id)));
        }
        self.store
            .resolve_suggestion(suggestion_id, SuggestionStatus::Merged, Some(into_skill_id))
            .await?;
        self.assign_from_review(suggestion.source_capability_id, into_skill_id)
            .await
    }

    async fn require_pending(&self, suggestion_id: Uuid) -> Result<SkillSuggestion, StoreError> {
        let suggestion = self
            .store
            .get_suggestion(suggestion_id)
            .await?
            .ok_or_else(|| StoreError::RowNotFound(format!("suggestion '{}'", suggestion_id)))?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(StoreError::RowNotFound(format!(
                "pending suggestion '{}'",
                suggestion_id
            )));
        }
        Ok(suggestion)
    }

    async fn assign_from_review(
        &self,
        capability_id: Uuid,
        skill_id: &str,
    ) -> Result<(), StoreError> {
        self.store
            .upsert_assignment(&SkillAssignment {
                capability_id,
                skill_id: skill_id.to_string(),
                confidence: 1.0,
                is_primary: true,
                source: AssignmentSource::HumanManual,
                assigned_at: Utc::now(),
            })
            .await?;
        self.store.mark_classified(capability_id).await
    }
}

/// Reduce a human-readable name to a skill slug: lowercase, alphanumeric
/// runs joined by single hyphens.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_hyphen = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Web Search"), "web-search");
        assert_eq!(slugify("PDF / Document  Tools!"), "pdf-document-tools");
        assert_eq!(slugify("--already--slugged--"), "already-slugged");
    }
}
