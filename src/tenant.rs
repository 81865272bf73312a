//! Tenant scoping.
//!
//! A caller's effective visible set is the union of the default meta-tools,
//! global capabilities, and capabilities scoped to the caller's org. Global
//! and org-scoped names live in independent namespaces, so one caller can
//! legitimately see two capabilities with the same display name; name
//! resolution gives the org-scoped one precedence (org shadows global),
//! while discovery lists both.

use serde::{Deserialize, Serialize};

use crate::registry::types::Capability;

/// The organization scope a call is made under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantScope {
    /// `None` means an anonymous caller that only sees defaults and globals.
    pub org_id: Option<String>,
}

impl TenantScope {
    pub fn global() -> Self {
        Self { org_id: None }
    }

    pub fn org(org_id: impl Into<String>) -> Self {
        Self {
            org_id: Some(org_id.into()),
        }
    }

    /// Whether a capability falls inside this scope's visible set.
    pub fn can_see(&self, capability: &Capability) -> bool {
        if capability.is_default || capability.is_global {
            return true;
        }
        match (&capability.org_id, &self.org_id) {
            (Some(cap_org), Some(caller_org)) => cap_org == caller_org,
            _ => false,
        }
    }

}

impl std::fmt::Display for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.org_id {
            Some(org) => write!(f, "org:{}", org),
            None => f.write_str("global"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::{NewCapability, UsageCounters};
    use chrono::Utc;
    use uuid::Uuid;

    fn cap(new: NewCapability) -> Capability {
        let now = Utc::now();
        Capability {
            id: Uuid::new_v4(),
            name: new.name,
            original_name: new.original_name,
            kind: new.kind,
            description: new.description,
            source_server_id: new.source_server_id,
            schema_or_content: new.schema_or_content,
            skill_ids: vec![],
            primary_skill_id: None,
            is_classified: false,
            org_id: new.org_id,
            is_global: new.is_global,
            is_default: new.is_default,
            is_active: true,
            is_deprecated: false,
            usage: UsageCounters::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn tool(name: &str) -> NewCapability {
        NewCapability::global_tool(name, "", serde_json::json!({}))
    }

    #[test]
    fn globals_visible_everywhere() {
        let global = cap(tool("search"));
        assert!(TenantScope::global().can_see(&global));
        assert!(TenantScope::org("acme").can_see(&global));
    }

    #[test]
    fn org_capability_hidden_from_other_orgs() {
        let scoped = cap(tool("search").with_org("acme"));
        assert!(TenantScope::org("acme").can_see(&scoped));
        assert!(!TenantScope::org("globex").can_see(&scoped));
        assert!(!TenantScope::global().can_see(&scoped));
    }

    #[test]
    fn defaults_always_visible() {
        let meta = cap(tool("discover").as_default());
        assert!(TenantScope::global().can_see(&meta));
        assert!(TenantScope::org("acme").can_see(&meta));
    }

}
