//! Deterministic relevance ranking for discovery.
//!
//! Plain keyword scoring, no model in the loop: the same query over the same
//! registry always returns the same ordering. Scores are capped per signal so
//! a long description cannot drown out an exact name hit.

use std::collections::HashMap;

use crate::registry::types::{Capability, SkillCategory};

const NAME_EXACT: u32 = 10;
const NAME_PARTIAL: u32 = 5;
const DESCRIPTION_HIT: u32 = 5;
const SKILL_HIT: u32 = 3;
const DIRECT_CAP: u32 = 30;
const SKILL_CAP: u32 = 15;
const PRIMARY_BONUS: u32 = 5;

/// Lowercased query tokens, two characters or longer.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

fn direct_score(tokens: &[String], capability: &Capability) -> u32 {
    let name = capability.name.to_lowercase();
    let name_words: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let description = capability.description.to_lowercase();

    let mut score = 0;
    for token in tokens {
        if name_words.iter().any(|w| w == token) {
            score += NAME_EXACT;
        } else if name.contains(token.as_str()) {
            score += NAME_PARTIAL;
        }
        if description.contains(token.as_str()) {
            score += DESCRIPTION_HIT;
        }
    }
    score.min(DIRECT_CAP)
}

fn skill_score(
    tokens: &[String],
    capability: &Capability,
    skills: &HashMap<&str, &SkillCategory>,
) -> u32 {
    let mut score = 0;
    for skill_id in &capability.skill_ids {
        let Some(skill) = skills.get(skill_id.as_str()) else {
            continue;
        };
        for token in tokens {
            let hit = skill.id.contains(token.as_str())
                || skill
                    .keywords
                    .iter()
                    .any(|k| k.to_lowercase().contains(token.as_str()))
                || skill
                    .examples
                    .iter()
                    .any(|e| e.to_lowercase().contains(token.as_str()));
            if hit {
                score += SKILL_HIT;
            }
        }
    }
    score.min(SKILL_CAP)
}

/// Score one capability against the query tokens. Zero means irrelevant.
pub fn score(
    tokens: &[String],
    capability: &Capability,
    skills: &HashMap<&str, &SkillCategory>,
) -> u32 {
    let direct = direct_score(tokens, capability);
    let via_skills = skill_score(tokens, capability, skills);
    let mut total = direct + via_skills;
    if total > 0 {
        // A hit whose primary skill also matches is a stronger signal than
        // one matched through a secondary assignment.
        if let Some(primary) = &capability.primary_skill_id {
            if let Some(skill) = skills.get(primary.as_str()) {
                let primary_hit = tokens.iter().any(|t| {
                    skill.id.contains(t.as_str())
                        || skill
                            .keywords
                            .iter()
                            .any(|k| k.to_lowercase().contains(t.as_str()))
                });
                if primary_hit {
                    total += PRIMARY_BONUS;
                }
            }
        }
    }
    total
}

/// Rank candidates by descending score, name ascending on ties, dropping
/// zero scores and truncating to `max`.
pub fn rank<'a>(
    query: &str,
    candidates: &'a [Capability],
    skills: &[SkillCategory],
    max: usize,
) -> Vec<&'a Capability> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Vec::new();
    }
    let by_id: HashMap<&str, &SkillCategory> =
        skills.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut scored: Vec<(u32, &Capability)> = candidates
        .iter()
        .map(|c| (score(&tokens, c, &by_id), c))
        .filter(|(s, _)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    scored.into_iter().take(max).map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::registry::types::{CapabilityKind, UsageCounters};

    fn capability(name: &str, description: &str, skill_ids: &[&str]) -> Capability {
        Capability {
            id: Uuid::new_v4(),
            name: name.to_string(),
            original_name: None,
            kind: CapabilityKind::Tool,
            description: description.to_string(),
            source_server_id: None,
            schema_or_content: serde_json::json!({"type": "object"}),
            skill_ids: skill_ids.iter().map(|s| s.to_string()).collect(),
            primary_skill_id: skill_ids.first().map(|s| s.to_string()),
            is_classified: !skill_ids.is_empty(),
            org_id: None,
            is_global: true,
            is_default: false,
            is_active: true,
            is_deprecated: false,
            usage: UsageCounters::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn skill(id: &str, keywords: &[&str]) -> SkillCategory {
        SkillCategory {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            examples: Vec::new(),
            parent_domain: None,
            tool_count: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn exact_name_beats_description_mention() {
        let caps = vec![
            capability("log_viewer", "Shows application output", &[]),
            capability("web_search", "Search logs and the web", &[]),
        ];
        let ranked = rank("search", &caps, &[], 10);
        assert_eq!(ranked[0].name, "web_search");
    }

    #[test]
    fn skill_keywords_surface_unmentioned_capabilities() {
        let caps = vec![capability("fetch_page", "Retrieve a URL", &["scraping"])];
        let skills = vec![skill("scraping", &["crawl", "extract", "harvest"])];
        let ranked = rank("harvest data from sites", &caps, &skills, 10);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn irrelevant_capabilities_are_dropped() {
        let caps = vec![capability("send_email", "Deliver a message", &[])];
        assert!(rank("quantum chemistry", &caps, &[], 10).is_empty());
    }

    #[test]
    fn truncates_to_max_with_stable_order() {
        let caps: Vec<Capability> = (0..20)
            .map(|i| capability(&format!("search_{i:02}"), "Find things", &[]))
            .collect();
        let first = rank("search", &caps, &[], 5);
        let second = rank("search", &caps, &[], 5);
        assert_eq!(first.len(), 5);
        let names: Vec<&str> = first.iter().map(|c| c.name.as_str()).collect();
        let names2: Vec<&str> = second.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, names2);
        // Equal scores fall back to name order.
        assert_eq!(names[0], "search_00");
    }

    #[test]
    fn empty_query_returns_nothing() {
        let caps = vec![capability("anything", "Whatever", &[])];
        assert!(rank("  ", &caps, &[], 10).is_empty());
        assert!(rank("a", &caps, &[], 10).is_empty());
    }

    #[test]
    fn direct_score_is_capped() {
        let cap = capability(
            "search_search_search",
            "search search search search search search search",
            &[],
        );
        let tokens = tokenize("search find locate query lookup");
        assert!(direct_score(&tokens, &cap) <= DIRECT_CAP);
    }
}
