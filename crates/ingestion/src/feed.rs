//! Feed lifecycle: one store, its coordinator, sweeper, writer and
//! subscription, started together and reloadable as a unit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use bulletin_common::FeedResult;

use crate::coordinator::IngestionCoordinator;
use crate::fetch::DocumentFetcher;
use crate::notify::{NotificationClient, TopicPattern};
use crate::persistence::{spawn_writer, PersistTrigger, ReferenceFile};
use crate::record::{FeedPolicy, FeedRecord, MergeOutcome};
use crate::store::SharedStore;
use crate::sweeper::ExpirySweeper;

/// Default sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Topic pattern to subscribe to.
    pub topic: String,
    /// Reference list written after every change and replayed at startup.
    pub state_file: PathBuf,
    pub sweep_interval: Duration,
    /// Fetches in flight during startup replay.
    pub replay_concurrency: usize,
    pub policy: FeedPolicy,
}

impl FeedConfig {
    pub fn new(topic: impl Into<String>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            topic: topic.into(),
            state_file: state_file.into(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            replay_concurrency: 4,
            policy: FeedPolicy::default(),
        }
    }
}

#[derive(Default)]
struct FeedTasks {
    listener: Option<JoinHandle<()>>,
    replay: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl FeedTasks {
    async fn stop_listener(&mut self) {
        for handle in [self.listener.take(), self.replay.take()].into_iter().flatten() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// A running feed.
pub struct Feed<R: FeedRecord> {
    coordinator: Arc<IngestionCoordinator<R>>,
    notifier: Arc<dyn NotificationClient>,
    persist: PersistTrigger,
    topic: RwLock<String>,
    tasks: Mutex<FeedTasks>,
    warm: watch::Receiver<bool>,
    warm_tx: Arc<watch::Sender<bool>>,
}

impl<R: FeedRecord> Feed<R> {
    /// Subscribe, start the sweeper and writer, and replay persisted state in
    /// the background.
    ///
    /// Fails only on configuration problems; the feed is marked warm once
    /// the replay has finished.
    pub async fn start(
        config: FeedConfig,
        fetcher: Arc<dyn DocumentFetcher<R>>,
        notifier: Arc<dyn NotificationClient>,
    ) -> FeedResult<Arc<Self>> {
        let _: TopicPattern = config.topic.parse()?;

        let file = ReferenceFile::new(&config.state_file);
        let references = file.load().await;
        let (persist, writer) = spawn_writer(file, R::FEED);

        let store = SharedStore::new();
        let coordinator = Arc::new(IngestionCoordinator::new(
            store.clone(),
            fetcher,
            config.policy,
            persist.clone(),
        ));

        let subscription = notifier.subscribe(&config.topic).await?;
        let listener = tokio::spawn(Arc::clone(&coordinator).run(subscription));

        let sweeper = ExpirySweeper::new(store, persist.clone(), config.sweep_interval).spawn();

        let (warm_tx, warm) = watch::channel(false);
        let warm_tx = Arc::new(warm_tx);
        let replay = {
            let coordinator = Arc::clone(&coordinator);
            let warm_tx = Arc::clone(&warm_tx);
            let concurrency = config.replay_concurrency;
            tokio::spawn(async move {
                coordinator.replay_from_persistence(references, concurrency).await;
                let _ = warm_tx.send(true);
            })
        };

        info!(
            feed = R::FEED,
            topic = %config.topic,
            state_file = %config.state_file.display(),
            sweep_interval_secs = config.sweep_interval.as_secs(),
            "Feed started"
        );

        Ok(Arc::new(Self {
            coordinator,
            notifier,
            persist,
            topic: RwLock::new(config.topic),
            tasks: Mutex::new(FeedTasks {
                listener: Some(listener),
                replay: Some(replay),
                sweeper: Some(sweeper),
                writer: Some(writer),
            }),
            warm,
            warm_tx,
        }))
    }

    pub fn store(&self) -> &SharedStore<R> {
        self.coordinator.store()
    }

    pub fn is_warm(&self) -> bool {
        *self.warm.borrow()
    }

    /// Wait until the startup replay has finished.
    pub async fn wait_until_warm(&self) {
        let mut warm = self.warm.clone();
        let _ = warm.wait_for(|w| *w).await;
    }

    pub async fn topic(&self) -> String {
        self.topic.read().await.clone()
    }

    pub async fn policy(&self) -> FeedPolicy {
        self.coordinator.policy().await
    }

    /// Whether the notification listener is still attached.
    pub async fn is_running(&self) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.listener.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Fetch and merge one reference right away.
    pub async fn fetch_now(&self, reference: &str) -> FeedResult<MergeOutcome> {
        self.coordinator.on_notification(reference, false).await
    }

    /// Switch to a new topic and policy.
    ///
    /// The new topic is validated and subscribed before anything is torn
    /// down, so a failed reload leaves the feed as it was. On success the
    /// old listener is fully stopped, the store is emptied and, if given,
    /// `immediate_reference` is fetched before returning.
    pub async fn reload(
        &self,
        topic: String,
        policy: FeedPolicy,
        immediate_reference: Option<String>,
    ) -> FeedResult<()> {
        let _: TopicPattern = topic.parse()?;
        let subscription = self.notifier.subscribe(&topic).await?;

        {
            let mut tasks = self.tasks.lock().await;
            tasks.stop_listener().await;
            self.coordinator.reset(policy).await;
            tasks.listener = Some(tokio::spawn(Arc::clone(&self.coordinator).run(subscription)));
        }
        let _ = self.warm_tx.send(true);

        let previous = std::mem::replace(&mut *self.topic.write().await, topic.clone());
        info!(feed = R::FEED, from = %previous, to = %topic, policy = ?policy, "Feed reloaded");

        if let Some(reference) = immediate_reference {
            if let Err(e) = self.fetch_now(&reference).await {
                warn!(feed = R::FEED, reference = %reference, error = %e, "Immediate fetch after reload failed");
            }
        }
        Ok(())
    }

    /// Stop all background work and write the final reference list.
    ///
    /// The final list goes through the feed's writer, which exits once it
    /// has landed; no other write can follow it.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        tasks.stop_listener().await;
        if let Some(sweeper) = tasks.sweeper.take() {
            sweeper.abort();
            let _ = sweeper.await;
        }

        let references = self.store().references().await;
        self.persist.finish(references.clone());
        if let Some(writer) = tasks.writer.take() {
            if let Err(e) = writer.await {
                warn!(feed = R::FEED, error = %e, "State writer failed");
            }
        }
        info!(feed = R::FEED, records = references.len(), "Feed stopped");
    }
}
