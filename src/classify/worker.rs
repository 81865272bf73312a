//! Background classification worker.
//!
//! Registration never waits on the oracle: new capabilities are written
//! unclassified and picked up here. Work arrives two ways, an explicit
//! enqueue from the registration path and a periodic sweep over whatever
//! `list_unclassified` returns, so a crashed or restarted process loses
//! nothing. Oracle failures are logged and the capability simply stays
//! unclassified until the next sweep.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use tracing::{debug, error, info};

use crate::classify::Classifier;
use crate::config::ClassifierConfig;
use crate::store::Store;

/// Handle the registration path uses to nudge the worker.
#[derive(Clone)]
pub struct ClassifyQueue {
    tx: mpsc::Sender<Uuid>,
}

impl ClassifyQueue {
    /// Ask the worker to classify a capability soon. Best effort: if the
    /// queue is full the periodic sweep will catch it instead.
    pub fn enqueue(&self, capability_id: Uuid) {
        if let Err(e) = self.tx.try_send(capability_id) {
            debug!(capability_id = %capability_id, "classify queue full, deferring to sweep: {e}");
        }
    }
}

pub struct ClassifyWorker {
    store: Arc<dyn Store>,
    classifier: Arc<Classifier>,
    rx: mpsc::Receiver<Uuid>,
    config: ClassifierConfig,
    limiter: Arc<Semaphore>,
}

impl ClassifyWorker {
    pub fn new(
        store: Arc<dyn Store>,
        classifier: Arc<Classifier>,
        config: ClassifierConfig,
    ) -> (Self, ClassifyQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let limiter = Arc::new(Semaphore::new(config.max_concurrency));
        (
            Self {
                store,
                classifier,
                rx,
                config,
                limiter,
            },
            ClassifyQueue { tx },
        )
    }

    /// Run until every queue handle is dropped.
    pub async fn run(mut self) {
        info!(
            poll_interval = ?self.config.poll_interval,
            max_concurrency = self.config.max_concurrency,
            "classification worker started"
        );
        let mut sweep = tokio::time::interval(self.config.poll_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                maybe_id = self.rx.recv() => {
                    match maybe_id {
                        Some(id) => self.spawn_one(&mut inflight, id).await,
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep(&mut inflight).await;
                }
                // Reap finished tasks so the set does not grow unbounded.
                Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
            }
        }
        while inflight.join_next().await.is_some() {}
        info!("classification worker stopped");
    }

    async fn sweep(&self, inflight: &mut JoinSet<()>) {
        let batch = match self
            .store
            .list_unclassified(self.config.sweep_batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!("failed to list unclassified capabilities: {e}");
                return;
            }
        };
        if !batch.is_empty() {
            debug!(count = batch.len(), "sweeping unclassified capabilities");
        }
        for capability in batch {
            self.spawn_one(inflight, capability.id).await;
        }
    }

    async fn spawn_one(&self, inflight: &mut JoinSet<()>, capability_id: Uuid) {
        let permit = match Arc::clone(&self.limiter).acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore is never closed while the worker runs.
            Err(_) => return,
        };
        let store = Arc::clone(&self.store);
        let classifier = Arc::clone(&self.classifier);
        inflight.spawn(async move {
            let _permit = permit;
            let capability = match store.get_capability(capability_id).await {
                Ok(Some(c)) => c,
                Ok(None) => {
                    // Deleted between enqueue and pickup.
                    debug!(capability_id = %capability_id, "capability gone before classification");
                    return;
                }
                Err(e) => {
                    error!(capability_id = %capability_id, "failed to load capability: {e}");
                    return;
                }
            };
            if capability.is_classified {
                return;
            }
            if let Err(e) = classifier.classify(&capability).await {
                error!(
                    capability = %capability.name,
                    "classification failed, will retry on next sweep: {e}"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::classify::oracle::{OracleAssignment, OracleVerdict};
    use crate::classify::testing::ScriptedOracle;
    use crate::error::ClassifyError;
    use crate::registry::types::{NewCapability, SkillCategory};

    fn test_config() -> ClassifierConfig {
        ClassifierConfig {
            poll_interval: Duration::from_millis(50),
            ..ClassifierConfig::default()
        }
    }

    async fn seeded_store() -> (Arc<dyn Store>, tempfile::TempDir) {
        let (store, dir) = crate::testing::test_store().await;
        store
            .create_skill(&SkillCategory {
                id: "web-search".to_string(),
                name: "web-search".to_string(),
                description: "Finding things on the web".to_string(),
                keywords: vec!["search".to_string()],
                examples: Vec::new(),
                parent_domain: None,
                tool_count: 0,
                is_active: true,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        (store, dir)
    }

    async fn wait_classified(store: &Arc<dyn Store>, id: Uuid) -> bool {
        for _ in 0..100 {
            if store
                .get_capability(id)
                .await
                .unwrap()
                .map(|c| c.is_classified)
                .unwrap_or(false)
            {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn enqueued_capability_gets_classified() {
        let (store, _dir) = seeded_store().await;
        let oracle = ScriptedOracle::new(vec![Ok(OracleVerdict::Assignments(vec![
            OracleAssignment {
                skill_id: "web-search".to_string(),
                confidence: 0.9,
            },
        ]))]);
        let config = test_config();
        let classifier = Arc::new(Classifier::new(
            Arc::clone(&store),
            Arc::new(oracle),
            &config,
        ));
        let (worker, queue) = ClassifyWorker::new(Arc::clone(&store), classifier, config);
        let handle = tokio::spawn(worker.run());

        let id = store
            .register_capability(&NewCapability::global_tool(
                "search",
                "Search the web",
                serde_json::json!({"type": "object"}),
            ))
            .await
            .unwrap();
        queue.enqueue(id);

        assert!(wait_classified(&store, id).await);
        let cap = store.get_capability(id).await.unwrap().unwrap();
        assert_eq!(cap.primary_skill_id.as_deref(), Some("web-search"));

        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sweep_retries_after_oracle_failure() {
        let (store, _dir) = seeded_store().await;
        let oracle = ScriptedOracle::new(vec![
            Err(ClassifyError::Oracle("boom".to_string())),
            Ok(OracleVerdict::Assignments(vec![OracleAssignment {
                skill_id: "web-search".to_string(),
                confidence: 0.9,
            }])),
        ]);
        let config = test_config();
        let classifier = Arc::new(Classifier::new(
            Arc::clone(&store),
            Arc::new(oracle),
            &config,
        ));
        let (worker, queue) = ClassifyWorker::new(Arc::clone(&store), classifier, config);
        let handle = tokio::spawn(worker.run());

        let id = store
            .register_capability(&NewCapability::global_tool(
                "search",
                "Search the web",
                serde_json::json!({"type": "object"}),
            ))
            .await
            .unwrap();
        // No explicit enqueue: the sweep must find it, fail once, and
        // succeed on the following pass.
        assert!(wait_classified(&store, id).await);

        drop(queue);
        handle.await.unwrap();
    }
}
