//! Periodic eviction of expired records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::persistence::PersistTrigger;
use crate::record::FeedRecord;
use crate::store::SharedStore;

pub struct ExpirySweeper<R: FeedRecord> {
    store: SharedStore<R>,
    persist: PersistTrigger,
    period: Duration,
}

impl<R: FeedRecord> ExpirySweeper<R> {
    pub fn new(store: SharedStore<R>, persist: PersistTrigger, period: Duration) -> Self {
        Self {
            store,
            persist,
            period,
        }
    }

    /// Evict records that expired before `now` and persist if anything went.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Vec<String> {
        let evicted = self
            .store
            .write(|store| {
                let evicted = store.sweep_expired(now);
                if !evicted.is_empty() {
                    self.persist.request(store.references());
                    gauge!("feed_records", "feed" => R::FEED).set(store.len() as f64);
                }
                evicted
            })
            .await;

        if evicted.is_empty() {
            debug!(feed = R::FEED, "Sweep found nothing to evict");
        } else {
            counter!("feed_evictions_total", "feed" => R::FEED).increment(evicted.len() as u64);
            info!(feed = R::FEED, evicted = ?evicted, "Evicted expired records");
        }
        evicted
    }

    /// Run forever, first sweep one period from now.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once(Utc::now()).await;
            }
        })
    }
}
