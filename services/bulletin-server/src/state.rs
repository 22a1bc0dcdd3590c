//! Shared application state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{error, info, warn};

use ingestion::{
    Alert, CapFetcher, CitypageFetcher, Conditions, Feed, FeedConfig, HttpDocumentSource,
    NotificationHub,
};

use crate::config::BulletinConfig;

pub const ALERTS_STATE_FILE: &str = "alerts.txt";
pub const CONDITIONS_STATE_FILE: &str = "conditions.txt";

/// Everything the HTTP handlers need.
pub struct AppState {
    pub alerts: Option<Arc<Feed<Alert>>>,
    pub conditions: Option<Arc<Feed<Conditions>>>,
    pub hub: Arc<NotificationHub>,
    /// Builds conditions document URLs from a station on reload.
    pub url_template: String,
    pub stream_interval: Duration,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Start the configured feeds against HTTP fetchers.
    ///
    /// A feed that fails to start is logged and left disabled; the service
    /// keeps running with the other one.
    pub async fn from_config(
        config: &BulletinConfig,
        state_dir: &Path,
        hub: Arc<NotificationHub>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(state_dir)
            .await
            .with_context(|| format!("Failed to create state dir {}", state_dir.display()))?;

        let source = HttpDocumentSource::new(config.fetch_timeout())?;

        let alerts = if config.alerts.enabled {
            let fetcher = Arc::new(CapFetcher::new(source.clone(), config.alerts.point()?));
            let feed_config = FeedConfig {
                topic: config.alerts.topic.clone(),
                state_file: state_dir.join(ALERTS_STATE_FILE),
                sweep_interval: config.sweep_interval(),
                replay_concurrency: config.replay_concurrency,
                policy: Default::default(),
            };
            match Feed::start(feed_config, fetcher, hub.clone()).await {
                Ok(feed) => Some(feed),
                Err(e) => {
                    error!(feed = "alerts", error = %e, "Feed failed to start");
                    None
                }
            }
        } else {
            info!(feed = "alerts", "Feed disabled");
            None
        };

        let conditions = if config.conditions.enabled {
            let fetcher = Arc::new(CitypageFetcher::new(source));
            let station = config.conditions.station();
            let feed_config = FeedConfig {
                topic: station.topic(),
                state_file: state_dir.join(CONDITIONS_STATE_FILE),
                sweep_interval: config.sweep_interval(),
                replay_concurrency: config.replay_concurrency,
                policy: config.conditions.policy(),
            };
            match Feed::start(feed_config, fetcher, hub.clone()).await {
                Ok(feed) => {
                    // Notifications only arrive on change; fetch once so a
                    // missed update doesn't leave the feed empty. Waiting for
                    // the replay keeps the configured station the live one.
                    let url = station.document_url(&config.conditions.url_template);
                    let initial = Arc::clone(&feed);
                    tokio::spawn(async move {
                        initial.wait_until_warm().await;
                        if let Err(e) = initial.fetch_now(&url).await {
                            warn!(feed = "conditions", url = %url, error = %e, "Initial fetch failed");
                        }
                    });
                    Some(feed)
                }
                Err(e) => {
                    error!(feed = "conditions", error = %e, "Feed failed to start");
                    None
                }
            }
        } else {
            info!(feed = "conditions", "Feed disabled");
            None
        };

        Ok(Self {
            alerts,
            conditions,
            hub,
            url_template: config.conditions.url_template.clone(),
            stream_interval: config.stream_interval(),
            metrics,
        })
    }

    /// Stop both feeds and flush their state files.
    pub async fn shutdown(&self) {
        if let Some(feed) = &self.alerts {
            feed.stop().await;
        }
        if let Some(feed) = &self.conditions {
            feed.stop().await;
        }
    }
}
