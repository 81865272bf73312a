//! Command-line interface: the serve loop plus the admin surface for skill
//! categories, suggestion review, and external servers.

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::registry::types::{SkillCategory, SuggestionStatus};
use crate::registry::{slugify, CapabilityRegistry};
use crate::store::Store;
use crate::tenant::TenantScope;

#[derive(Parser)]
#[command(name = "capgate", version, about = "Capability gateway for LLM agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway: classification worker, resync loop, meta-tools.
    Run,
    /// Manage skill categories and review suggestions.
    Skill {
        #[command(subcommand)]
        command: SkillCommand,
    },
    /// Manage external capability servers.
    Server {
        #[command(subcommand)]
        command: ServerCommand,
    },
}

#[derive(Subcommand)]
pub enum SkillCommand {
    /// List skill categories.
    List {
        /// Include deactivated categories.
        #[arg(long)]
        all: bool,
    },
    /// Create a skill category.
    Add {
        /// Human-readable name; the slug is derived from it.
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma-separated match keywords.
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Deactivate a category. Refused while capabilities are assigned to it.
    Deactivate { id: String },
    /// Pin a capability to a category as a human override. Survives
    /// reclassification.
    Assign {
        /// Capability name.
        capability: String,
        /// Skill category slug.
        skill: String,
        /// Also make this the capability's primary skill.
        #[arg(long)]
        primary: bool,
        /// Org the capability is scoped to, when not global.
        #[arg(long)]
        org: Option<String>,
    },
    /// List pending skill suggestions.
    Suggestions,
    /// Approve a suggestion, creating the proposed category.
    Approve { id: Uuid },
    /// Reject a suggestion.
    Reject { id: Uuid },
    /// Merge a suggestion into an existing category.
    Merge {
        id: Uuid,
        /// Slug of the category to merge into.
        #[arg(long)]
        into: String,
    },
}

#[derive(Subcommand)]
pub enum ServerCommand {
    /// Register an external server and import its catalog.
    Add {
        /// Short slug; imported names are prefixed with it.
        slug: String,
        /// JSON-RPC endpoint URL.
        endpoint: String,
    },
    /// Remove a server and everything imported from it.
    Remove { slug: String },
    /// List registered servers.
    List,
}

pub async fn handle_skill(store: Arc<dyn Store>, command: SkillCommand) -> anyhow::Result<()> {
    let registry = CapabilityRegistry::new(Arc::clone(&store));
    match command {
        SkillCommand::List { all } => {
            let skills = store.list_skills(!all).await?;
            if skills.is_empty() {
                println!("no skill categories");
                return Ok(());
            }
            for skill in skills {
                let flag = if skill.is_active { "" } else { " (inactive)" };
                println!(
                    "{:<28} {:>4} tools  {}{}",
                    skill.id, skill.tool_count, skill.description, flag
                );
            }
        }
        SkillCommand::Add {
            name,
            description,
            keywords,
            parent,
        } => {
            let slug = slugify(&name);
            if slug.is_empty() {
                bail!("'{name}' does not reduce to a usable slug");
            }
            store
                .create_skill(&SkillCategory {
                    id: slug.clone(),
                    name,
                    description,
                    keywords,
                    examples: Vec::new(),
                    parent_domain: parent,
                    tool_count: 0,
                    is_active: true,
                    created_at: Utc::now(),
                })
                .await
                .context("failed to create skill category")?;
            println!("created skill '{slug}'");
        }
        SkillCommand::Deactivate { id } => {
            store.deactivate_skill(&id).await?;
            println!("deactivated skill '{id}'");
        }
        SkillCommand::Assign {
            capability,
            skill,
            primary,
            org,
        } => {
            let scope = match org {
                Some(org) => TenantScope::org(org),
                None => TenantScope::global(),
            };
            let cap = store
                .get_capability_by_name(&capability, &scope)
                .await?
                .with_context(|| format!("no capability named '{capability}' in scope"))?;
            registry.override_assignment(cap.id, &skill, primary).await?;
            let suffix = if primary { " as primary" } else { "" };
            println!("assigned '{skill}' to '{capability}'{suffix}");
        }
        SkillCommand::Suggestions => {
            let pending = store
                .list_suggestions(Some(SuggestionStatus::Pending))
                .await?;
            if pending.is_empty() {
                println!("no pending suggestions");
                return Ok(());
            }
            for suggestion in pending {
                println!(
                    "{}  {:<24} {}",
                    suggestion.id, suggestion.suggested_name, suggestion.reasoning
                );
            }
        }
        SkillCommand::Approve { id } => {
            let slug = registry.approve_suggestion(id).await?;
            println!("approved; created skill '{slug}'");
        }
        SkillCommand::Reject { id } => {
            registry.reject_suggestion(id).await?;
            println!("rejected suggestion {id}");
        }
        SkillCommand::Merge { id, into } => {
            registry.merge_suggestion(id, &into).await?;
            println!("merged suggestion {id} into '{into}'");
        }
    }
    Ok(())
}

pub async fn handle_server(
    store: Arc<dyn Store>,
    aggregator: Arc<Aggregator>,
    command: ServerCommand,
) -> anyhow::Result<()> {
    match command {
        ServerCommand::Add { slug, endpoint } => {
            let parsed: url::Url = endpoint
                .parse()
                .with_context(|| format!("'{endpoint}' is not a valid URL"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("endpoint must be http or https, got '{}'", parsed.scheme());
            }
            let server = aggregator
                .add_server(&slug, serde_json::json!({ "endpoint": endpoint }))
                .await?;
            let imported = store.list_for_server(server.id).await?.len();
            println!(
                "added server '{}' ({}), {} capabilities imported",
                server.slug,
                server.status.as_str(),
                imported
            );
        }
        ServerCommand::Remove { slug } => {
            aggregator.remove_server(&slug).await?;
            println!("removed server '{slug}'");
        }
        ServerCommand::List => {
            let servers = store.list_servers().await?;
            if servers.is_empty() {
                println!("no external servers");
                return Ok(());
            }
            for server in servers {
                let synced = server
                    .last_synced_at
                    .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<20} {:<12} last sync {}",
                    server.slug,
                    server.status.as_str(),
                    synced
                );
            }
        }
    }
    Ok(())
}
