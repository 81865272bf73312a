//! Skill classification engine.
//!
//! Capabilities register immediately and get classified here afterwards, off
//! the registration path. Each classification consults the oracle once,
//! filters its verdict by a confidence threshold, and writes the surviving
//! assignments in a single transaction. Human-made assignments are never
//! touched by this module.

pub mod oracle;
pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::registry::types::{Capability, SkillSuggestion, SuggestionStatus};
use crate::store::Store;

pub use oracle::{ChatOracle, ClassifyOracle, OracleVerdict};
pub use worker::{ClassifyQueue, ClassifyWorker};

pub struct Classifier {
    store: Arc<dyn Store>,
    oracle: Arc<dyn ClassifyOracle>,
    confidence_threshold: f64,
}

impl Classifier {
    pub fn new(
        store: Arc<dyn Store>,
        oracle: Arc<dyn ClassifyOracle>,
        config: &ClassifierConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            confidence_threshold: config.confidence_threshold,
        }
    }

    /// Classify one capability end to end.
    ///
    /// On success the capability is marked classified, either with the
    /// assignments that cleared the threshold or with none at all. When the
    /// oracle proposes a new skill instead, a pending suggestion is recorded
    /// and the capability stays unclassified until a human reviews it.
    pub async fn classify(&self, capability: &Capability) -> Result<(), ClassifyError> {
        let catalog = self.store.list_skills(true).await?;

        let verdict = self
            .oracle
            .classify(&capability.name, &capability.description, &catalog)
            .await?;

        match verdict {
            OracleVerdict::Assignments(raw) => {
                // Insertion order of the catalog breaks confidence ties, so
                // equal inputs always produce the same primary.
                let order: HashMap<&str, usize> = catalog
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (s.id.as_str(), i))
                    .collect();

                // Best confidence per skill; a duplicated skill id must not
                // reach the store twice.
                let mut best: HashMap<String, f64> = HashMap::new();
                for a in raw {
                    if a.confidence < self.confidence_threshold {
                        continue;
                    }
                    if !order.contains_key(a.skill_id.as_str()) {
                        warn!(
                            capability = %capability.name,
                            skill = %a.skill_id,
                            "oracle returned a skill that is not in the catalog, dropping"
                        );
                        continue;
                    }
                    let confidence = a.confidence;
                    let entry = best.entry(a.skill_id).or_insert(confidence);
                    if confidence > *entry {
                        *entry = confidence;
                    }
                }

                let mut kept: Vec<(String, f64)> = best.into_iter().collect();
                kept.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| order[a.0.as_str()].cmp(&order[b.0.as_str()]))
                });

                let primary = kept.first().map(|(id, _)| id.clone());
                if kept.is_empty() {
                    debug!(
                        capability = %capability.name,
                        "no assignment cleared the confidence threshold"
                    );
                }
                self.store
                    .replace_auto_assignments(capability.id, &kept, primary.as_deref())
                    .await?;
                info!(
                    capability = %capability.name,
                    assignments = kept.len(),
                    primary = primary.as_deref().unwrap_or("-"),
                    "classified"
                );
            }
            OracleVerdict::Suggestion(s) => {
                // Don't pile up duplicate proposals while the capability
                // waits for review.
                let already_pending = self
                    .store
                    .list_suggestions(Some(SuggestionStatus::Pending))
                    .await?
                    .iter()
                    .any(|existing| existing.source_capability_id == capability.id);
                if already_pending {
                    debug!(
                        capability = %capability.name,
                        "suggestion already pending, skipping"
                    );
                    return Ok(());
                }
                self.store
                    .create_suggestion(&SkillSuggestion {
                        id: Uuid::new_v4(),
                        suggested_name: s.name.clone(),
                        suggested_description: s.description,
                        source_capability_id: capability.id,
                        reasoning: s.reasoning,
                        status: SuggestionStatus::Pending,
                        merged_into_skill_id: None,
                        created_at: Utc::now(),
                        resolved_at: None,
                    })
                    .await?;
                info!(
                    capability = %capability.name,
                    proposed = %s.name,
                    "oracle proposed a new skill, awaiting review"
                );
            }
        }
        Ok(())
    }
}
