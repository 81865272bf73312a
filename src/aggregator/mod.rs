//! External server aggregator.
//!
//! Imports remote capability catalogs into the registry under namespaced
//! names (`"{server-slug}.{original}"`), keeps them in sync with periodic
//! resyncs, and proxies execute calls to the owning server. An unreachable
//! server is marked degraded and keeps its last-known catalog visible, but
//! execution against it fails fast.

pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classify::ClassifyQueue;
use crate::config::AggregatorConfig;
use crate::error::AggregatorError;
use crate::registry::types::{
    Capability, ExternalServer, NewCapability, ServerStatus,
};
use crate::registry::CapabilityRegistry;
use crate::store::Store;

pub use transport::{HttpTransport, RemoteCapability, RemoteTransport};

/// What one resync changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub deactivated: usize,
    pub reactivated: usize,
    pub updated: usize,
}

pub struct Aggregator {
    store: Arc<dyn Store>,
    registry: CapabilityRegistry,
    transport: Arc<dyn RemoteTransport>,
    resync_interval: Duration,
    classify_queue: Option<ClassifyQueue>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn RemoteTransport>,
        config: &AggregatorConfig,
    ) -> Self {
        Self {
            registry: CapabilityRegistry::new(Arc::clone(&store)),
            store,
            transport,
            resync_interval: config.resync_interval,
            classify_queue: None,
        }
    }

    /// Nudge the classification worker as imports land, instead of waiting
    /// for its next sweep.
    pub fn with_classify_queue(mut self, queue: ClassifyQueue) -> Self {
        self.classify_queue = Some(queue);
        self
    }

    /// Register a server and import its catalog. The server record is kept
    /// even when the first import fails; it just starts out degraded with an
    /// empty catalog.
    pub async fn add_server(
        &self,
        slug: &str,
        transport_config: Value,
    ) -> Result<ExternalServer, AggregatorError> {
        let server = ExternalServer {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            transport_config,
            status: ServerStatus::Disconnected,
            last_synced_at: None,
            created_at: Utc::now(),
        };
        self.store.add_server(&server).await?;
        info!(slug = %slug, "external server added");

        match self.resync(server.id).await {
            Ok(report) => {
                info!(slug = %slug, added = report.added, "initial import complete");
            }
            Err(e) => {
                warn!(slug = %slug, "initial import failed, server starts degraded: {e}");
            }
        }
        self.store
            .get_server(server.id)
            .await?
            .ok_or_else(|| AggregatorError::UnknownServer(slug.to_string()))
    }

    /// Remove a server together with every capability imported from it.
    pub async fn remove_server(&self, slug: &str) -> Result<(), AggregatorError> {
        let server = self.require_server(slug).await?;
        self.store.remove_server(server.id).await?;
        info!(slug = %slug, "external server removed");
        Ok(())
    }

    /// Reconcile the registry with the server's current catalog.
    ///
    /// Additions register (namespaced, disambiguated) and queue for
    /// classification through the usual unclassified sweep. Removals with
    /// recorded calls are deactivated so their history survives; never-used
    /// ones are deleted outright. A materially changed description clears
    /// the classification so the capability is reclassified.
    pub async fn resync(&self, server_id: Uuid) -> Result<SyncReport, AggregatorError> {
        let server = self
            .store
            .get_server(server_id)
            .await?
            .ok_or_else(|| AggregatorError::UnknownServer(server_id.to_string()))?;

        let catalog = match self.transport.list_capabilities(&server).await {
            Ok(catalog) => catalog,
            Err(e) => {
                // Keep the last-known snapshot visible; only execution
                // against this server fails until it comes back.
                self.store
                    .set_server_status(server.id, ServerStatus::Degraded, None)
                    .await?;
                warn!(slug = %server.slug, "resync failed, server degraded: {e}");
                return Err(e);
            }
        };

        let existing = self.store.list_for_server(server.id).await?;
        let mut report = SyncReport::default();

        for remote in &catalog {
            // A server may expose a tool and a prompt under the same remote
            // name, so identity is (kind, original_name).
            let known = existing.iter().find(|c| {
                c.kind == remote.kind && c.original_name.as_deref() == Some(remote.name.as_str())
            });
            match known {
                None => {
                    let namespaced = format!("{}.{}", server.slug, remote.name);
                    let new = NewCapability {
                        name: namespaced,
                        original_name: Some(remote.name.clone()),
                        kind: remote.kind,
                        description: remote.description.clone(),
                        source_server_id: Some(server.id),
                        schema_or_content: remote.schema_or_content.clone(),
                        org_id: None,
                        is_global: true,
                        is_default: false,
                    };
                    let (id, used_name) = self.registry.register_disambiguated(new).await?;
                    debug!(slug = %server.slug, name = %used_name, "imported capability");
                    if let Some(queue) = &self.classify_queue {
                        queue.enqueue(id);
                    }
                    report.added += 1;
                }
                Some(current) => {
                    if !current.is_active {
                        self.store.set_capability_active(current.id, true).await?;
                        report.reactivated += 1;
                    }
                    if current.description != remote.description {
                        self.store
                            .update_description(current.id, &remote.description)
                            .await?;
                        debug!(
                            slug = %server.slug,
                            name = %current.name,
                            "description changed, queued for reclassification"
                        );
                        if let Some(queue) = &self.classify_queue {
                            queue.enqueue(current.id);
                        }
                        report.updated += 1;
                    }
                }
            }
        }

        for current in &existing {
            let still_remote = current
                .original_name
                .as_deref()
                .is_some_and(|orig| {
                    catalog
                        .iter()
                        .any(|r| r.kind == current.kind && r.name == orig)
                });
            if still_remote {
                continue;
            }
            if current.usage.call_count > 0 {
                if current.is_active {
                    self.store.set_capability_active(current.id, false).await?;
                    report.deactivated += 1;
                }
            } else {
                self.store.delete_capability(current.id).await?;
                report.removed += 1;
            }
        }

        let now = Utc::now();
        self.store
            .set_server_status(server.id, ServerStatus::Connected, Some(now))
            .await?;
        info!(
            slug = %server.slug,
            added = report.added,
            removed = report.removed,
            deactivated = report.deactivated,
            reactivated = report.reactivated,
            updated = report.updated,
            "resync complete"
        );
        Ok(report)
    }

    /// Proxy an execute call to the capability's owning server. One attempt;
    /// a degraded or disconnected server fails immediately without touching
    /// the network.
    pub async fn invoke(
        &self,
        capability: &Capability,
        arguments: &Value,
    ) -> Result<Value, AggregatorError> {
        let server_id = capability.source_server_id.ok_or_else(|| {
            AggregatorError::Transport(format!(
                "capability '{}' is not backed by an external server",
                capability.name
            ))
        })?;
        let server = self
            .store
            .get_server(server_id)
            .await?
            .ok_or_else(|| AggregatorError::UnknownServer(server_id.to_string()))?;

        if server.status != ServerStatus::Connected {
            return Err(AggregatorError::Transport(format!(
                "server '{}' is {}",
                server.slug,
                server.status.as_str()
            )));
        }

        let original = capability
            .original_name
            .as_deref()
            .unwrap_or(&capability.name);
        let result = self
            .transport
            .invoke(&server, capability.kind, original, arguments)
            .await;
        if let Err(ref e) = result {
            if matches!(e, AggregatorError::Transport(_) | AggregatorError::Timeout(_)) {
                self.store
                    .set_server_status(server.id, ServerStatus::Degraded, None)
                    .await?;
                warn!(slug = %server.slug, "invoke failed, server degraded: {e}");
            }
        }
        result
    }

    /// Periodic resync over every registered server. Runs until the process
    /// exits.
    pub async fn run_resync_loop(self: Arc<Self>) {
        info!(interval = ?self.resync_interval, "resync loop started");
        let mut tick = tokio::time::interval(self.resync_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would repeat the import done at startup.
        tick.tick().await;
        loop {
            tick.tick().await;
            let servers = match self.store.list_servers().await {
                Ok(servers) => servers,
                Err(e) => {
                    error!("failed to list servers for resync: {e}");
                    continue;
                }
            };
            for server in servers {
                if let Err(e) = self.resync(server.id).await {
                    // Already logged and marked degraded inside resync.
                    debug!(slug = %server.slug, "resync error: {e}");
                }
            }
        }
    }

    async fn require_server(&self, slug: &str) -> Result<ExternalServer, AggregatorError> {
        self.store
            .get_server_by_slug(slug)
            .await?
            .ok_or_else(|| AggregatorError::UnknownServer(slug.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::transport::{RemoteCapability, RemoteTransport};
    use crate::error::AggregatorError;
    use crate::registry::types::{CapabilityKind, ExternalServer};

    /// In-memory transport whose catalog and behavior tests mutate directly.
    #[derive(Default)]
    pub struct FakeTransport {
        pub catalogs: Mutex<HashMap<String, Vec<RemoteCapability>>>,
        pub unreachable: Mutex<bool>,
        pub responses: Mutex<HashMap<String, Value>>,
    }

    impl FakeTransport {
        pub fn set_catalog(&self, slug: &str, catalog: Vec<RemoteCapability>) {
            self.catalogs
                .lock()
                .unwrap()
                .insert(slug.to_string(), catalog);
        }

        pub fn set_unreachable(&self, down: bool) {
            *self.unreachable.lock().unwrap() = down;
        }

        pub fn tool(name: &str, description: &str) -> RemoteCapability {
            RemoteCapability {
                name: name.to_string(),
                kind: CapabilityKind::Tool,
                description: description.to_string(),
                schema_or_content: serde_json::json!({
                    "type": "object",
                    "properties": {},
                }),
            }
        }

        pub fn prompt(name: &str, description: &str) -> RemoteCapability {
            RemoteCapability {
                name: name.to_string(),
                kind: CapabilityKind::Prompt,
                description: description.to_string(),
                schema_or_content: serde_json::json!({ "template": "" }),
            }
        }
    }

    #[async_trait]
    impl RemoteTransport for FakeTransport {
        async fn list_capabilities(
            &self,
            server: &ExternalServer,
        ) -> Result<Vec<RemoteCapability>, AggregatorError> {
            if *self.unreachable.lock().unwrap() {
                return Err(AggregatorError::Transport("connection refused".to_string()));
            }
            Ok(self
                .catalogs
                .lock()
                .unwrap()
                .get(&server.slug)
                .cloned()
                .unwrap_or_default())
        }

        async fn invoke(
            &self,
            _server: &ExternalServer,
            _kind: CapabilityKind,
            original_name: &str,
            _arguments: &Value,
        ) -> Result<Value, AggregatorError> {
            if *self.unreachable.lock().unwrap() {
                return Err(AggregatorError::Transport("connection refused".to_string()));
            }
            self.responses
                .lock()
                .unwrap()
                .get(original_name)
                .cloned()
                .ok_or_else(|| AggregatorError::Remote(format!("no such tool '{original_name}'")))
        }
    }
}
