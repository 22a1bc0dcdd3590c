//! Ingestion coordinator: turns notifications into fetch-then-merge work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bulletin_common::{FeedError, FeedResult};

use crate::fetch::DocumentFetcher;
use crate::notify::{NotificationEvent, Subscription};
use crate::persistence::PersistTrigger;
use crate::record::{FeedPolicy, FeedRecord, MergeOutcome};
use crate::store::SharedStore;

/// Summary of a startup replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub attempted: usize,
    pub merged: usize,
    pub failed: usize,
}

/// Wires notifications to the fetcher and the store for one feed.
pub struct IngestionCoordinator<R: FeedRecord> {
    store: SharedStore<R>,
    fetcher: Arc<dyn DocumentFetcher<R>>,
    policy: RwLock<FeedPolicy>,
    persist: PersistTrigger,
    /// Bumped by [`reset`](Self::reset); work started under an older epoch
    /// is discarded instead of merged.
    epoch: AtomicU64,
}

impl<R: FeedRecord> IngestionCoordinator<R> {
    pub fn new(
        store: SharedStore<R>,
        fetcher: Arc<dyn DocumentFetcher<R>>,
        policy: FeedPolicy,
        persist: PersistTrigger,
    ) -> Self {
        Self {
            store,
            fetcher,
            policy: RwLock::new(policy),
            persist,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &SharedStore<R> {
        &self.store
    }

    pub async fn policy(&self) -> FeedPolicy {
        *self.policy.read().await
    }

    /// Fetch the referenced document and merge it.
    ///
    /// Failures are returned to the caller and leave the store untouched;
    /// there is no retry.
    pub async fn on_notification(&self, reference: &str, replay: bool) -> FeedResult<MergeOutcome> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        counter!("feed_notifications_total", "feed" => R::FEED).increment(1);

        let record = self.fetcher.fetch(reference, replay).await.map_err(|e| {
            counter!("feed_fetch_failures_total", "feed" => R::FEED, "kind" => e.kind())
                .increment(1);
            e
        })?;

        self.merge(record, epoch).await
    }

    async fn merge(&self, record: R, epoch: u64) -> FeedResult<MergeOutcome> {
        let policy = self.policy().await;
        let identifier = record.identifier().to_string();

        let outcome = self
            .store
            .write(|store| {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    return None;
                }
                let outcome = R::reconcile(store, record, &policy);
                if outcome.changed() {
                    self.persist.request(store.references());
                }
                gauge!("feed_records", "feed" => R::FEED).set(store.len() as f64);
                Some(outcome)
            })
            .await
            .ok_or_else(|| FeedError::Detached(identifier.clone()))?;

        counter!("feed_merges_total", "feed" => R::FEED, "outcome" => outcome.label()).increment(1);
        match &outcome {
            MergeOutcome::Superseded { by } => {
                info!(feed = R::FEED, identifier = %identifier, superseded_by = %by, "Ignoring stale record")
            }
            MergeOutcome::Replaced(old) => {
                info!(feed = R::FEED, identifier = %identifier, replaced = %old, "Replaced record")
            }
            other => info!(feed = R::FEED, identifier = %identifier, outcome = other.label(), "Merged record"),
        }
        Ok(outcome)
    }

    /// Handle one notification, logging instead of returning failures.
    pub async fn handle(&self, reference: &str, replay: bool) -> bool {
        match self.on_notification(reference, replay).await {
            Ok(_) => true,
            Err(e @ (FeedError::OutOfArea(_) | FeedError::Detached(_))) => {
                debug!(feed = R::FEED, reference = %reference, reason = %e, "Skipped notification");
                false
            }
            Err(e) => {
                warn!(feed = R::FEED, reference = %reference, kind = e.kind(), error = %e, "Dropped notification");
                false
            }
        }
    }

    /// Fire-and-forget handling of one notification.
    pub fn spawn_notification(self: &Arc<Self>, reference: String) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.handle(&reference, false).await;
        })
    }

    /// Rebuild the store from persisted references.
    ///
    /// Fetches run with at most `concurrency` in flight; results are merged
    /// in file order. Individual failures don't stop the replay.
    pub async fn replay_from_persistence(
        &self,
        references: Vec<String>,
        concurrency: usize,
    ) -> ReplayReport {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut report = ReplayReport {
            attempted: references.len(),
            ..Default::default()
        };

        let mut fetched = stream::iter(references)
            .map(|reference| async move {
                let result = self.fetcher.fetch(&reference, true).await;
                (reference, result)
            })
            .buffered(concurrency.max(1));

        while let Some((reference, result)) = fetched.next().await {
            let merged = match result {
                Ok(record) => self.merge(record, epoch).await,
                Err(e) => Err(e),
            };
            match merged {
                Ok(_) => report.merged += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(feed = R::FEED, reference = %reference, error = %e, "Replay entry failed");
                }
            }
        }

        info!(
            feed = R::FEED,
            attempted = report.attempted,
            merged = report.merged,
            failed = report.failed,
            "Replayed persisted state"
        );
        report
    }

    /// Consume a subscription until it closes.
    pub async fn run(self: Arc<Self>, mut subscription: Subscription) {
        info!(feed = R::FEED, pattern = %subscription.pattern(), "Listening for notifications");

        while let Some(event) = subscription.recv().await {
            match event {
                NotificationEvent::Message {
                    reference,
                    received_at,
                    ..
                } => {
                    debug!(feed = R::FEED, reference = %reference, received_at = %received_at, "Notification");
                    self.spawn_notification(reference);
                }
                NotificationEvent::Error { message } => {
                    counter!("feed_transport_errors_total", "feed" => R::FEED).increment(1);
                    warn!(feed = R::FEED, error = %message, "Notification transport error");
                }
            }
        }

        info!(feed = R::FEED, "Notification subscription closed");
    }

    /// Drop every record, switch policy and discard in-flight work.
    pub async fn reset(&self, policy: FeedPolicy) {
        *self.policy.write().await = policy;
        self.store
            .write(|store| {
                self.epoch.fetch_add(1, Ordering::SeqCst);
                store.clear();
                self.persist.request(Vec::new());
                gauge!("feed_records", "feed" => R::FEED).set(0.0);
            })
            .await;
    }
}
