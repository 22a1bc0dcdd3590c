//! End-to-end feed tests: notifications, persistence, restart and reload,
//! with documents served from in-memory fixtures instead of HTTP.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use bulletin_common::{FeedError, FeedResult};
use ingestion::fetch::filter_area;
use ingestion::{
    parse_cap, parse_citypage, Alert, Conditions, DocumentFetcher, Feed, FeedConfig, FeedPolicy,
    MergeOutcome, NotificationHub, StationLocation, Store, ALERTS_TOPIC, DEFAULT_URL_TEMPLATE,
};
use test_utils::fixtures::{cap, citypage};
use test_utils::StateDir;

const FAR_FUTURE: &str = "2099-01-01T00:00:00-00:00";
const TORONTO: (f64, f64) = (43.7, -79.4);

/// Serves documents from a map keyed by reference.
#[derive(Default)]
struct FixtureFetcher {
    documents: std::sync::RwLock<HashMap<String, String>>,
    point: Option<(f64, f64)>,
}

impl FixtureFetcher {
    fn insert(&self, reference: &str, document: String) {
        self.documents
            .write()
            .unwrap()
            .insert(reference.to_string(), document);
    }

    fn document(&self, reference: &str) -> FeedResult<String> {
        self.documents
            .read()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| FeedError::fetch(reference, "HTTP 404 Not Found"))
    }
}

#[async_trait]
impl DocumentFetcher<Alert> for FixtureFetcher {
    async fn fetch(&self, reference: &str, _replay: bool) -> FeedResult<Alert> {
        let alert = parse_cap(&self.document(reference)?, reference)?;
        filter_area(alert, self.point)
    }
}

#[async_trait]
impl DocumentFetcher<Conditions> for FixtureFetcher {
    async fn fetch(&self, reference: &str, _replay: bool) -> FeedResult<Conditions> {
        parse_citypage(&self.document(reference)?, reference)
    }
}

fn alert_url(n: usize) -> String {
    format!("https://dd.weather.gc.ca/alerts/cap/20240115/CWTO/{:02}.cap", n)
}

fn alerts_config(dir: &StateDir) -> FeedConfig {
    FeedConfig::new(ALERTS_TOPIC, dir.file("alerts.txt"))
}

/// Alert documents exercising insertion, supersession and mixed priority.
fn alert_documents() -> Vec<(String, String)> {
    let docs = [
        ("A1", "Minor", "Expected", "2024-01-15T10:00:00-00:00", vec![]),
        ("A2", "Severe", "Immediate", "2024-01-15T10:05:00-00:00", vec![]),
        ("A3", "Moderate", "Future", "2024-01-15T10:10:00-00:00", vec![]),
        ("A4", "Extreme", "Expected", "2024-01-15T11:00:00-00:00", vec!["A1"]),
        ("A5", "Moderate", "Future", "2024-01-15T11:30:00-00:00", vec![]),
        ("A6", "Moderate", "Expected", "2024-01-15T12:00:00-00:00", vec!["A3"]),
    ];
    docs.iter()
        .enumerate()
        .map(|(n, (id, severity, urgency, sent, refs))| {
            (
                alert_url(n),
                cap::alert_xml(id, severity, urgency, sent, FAR_FUTURE, refs),
            )
        })
        .collect()
}

async fn wait_for_records<R: ingestion::FeedRecord>(feed: &Feed<R>, count: usize) {
    for _ in 0..200 {
        if feed.store().len().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} records, found {}",
        count,
        feed.store().len().await
    );
}

fn ids(alerts: &[Alert]) -> Vec<String> {
    alerts.iter().map(|a| a.identifier.clone()).collect()
}

#[tokio::test]
async fn test_restart_replay_matches_sequential_merge() {
    let dir = StateDir::new();
    let hub = Arc::new(NotificationHub::new());
    let fetcher = Arc::new(FixtureFetcher::default());
    let documents = alert_documents();

    let mut expected = Store::new();
    for (url, xml) in &documents {
        fetcher.insert(url, xml.clone());
        expected.merge(parse_cap(xml, url).unwrap());
    }

    let first = Feed::<Alert>::start(alerts_config(&dir), fetcher.clone(), hub.clone())
        .await
        .unwrap();
    first.wait_until_warm().await;
    for (url, _) in &documents {
        first.fetch_now(url).await.unwrap();
    }
    assert_eq!(ids(&first.store().snapshot().await), ids(&expected.snapshot()));
    first.stop().await;

    assert_eq!(dir.read_lines("alerts.txt"), expected.references());

    let second = Feed::<Alert>::start(alerts_config(&dir), fetcher.clone(), hub.clone())
        .await
        .unwrap();
    second.wait_until_warm().await;

    assert!(second.is_warm());
    assert_eq!(ids(&second.store().snapshot().await), ids(&expected.snapshot()));
    assert_eq!(ids(&second.store().all().await), ids(&expected.all()));
    assert_eq!(
        ids(&second.store().snapshot().await),
        vec!["A4", "A2", "A6", "A5"]
    );
}

#[tokio::test]
async fn test_replay_skips_unfetchable_references() {
    let dir = StateDir::new();
    let fetcher = Arc::new(FixtureFetcher::default());
    fetcher.insert(&alert_url(0), cap::RAINFALL_WARNING.to_string());
    dir.seed_references("alerts.txt", &[&alert_url(9), &alert_url(0), "not a url"]);

    let feed = Feed::<Alert>::start(alerts_config(&dir), fetcher, Arc::new(NotificationHub::new()))
        .await
        .unwrap();
    feed.wait_until_warm().await;

    let alerts = feed.store().snapshot().await;
    assert_eq!(ids(&alerts), vec![cap::RAINFALL_WARNING_ID]);
}

#[tokio::test]
async fn test_published_notifications_reach_the_store() {
    let dir = StateDir::new();
    let hub = Arc::new(NotificationHub::new());
    let fetcher = Arc::new(FixtureFetcher::default());
    fetcher.insert(&alert_url(0), cap::RAINFALL_WARNING.to_string());
    fetcher.insert(&alert_url(1), cap::RAINFALL_UPDATE.to_string());

    let feed = Feed::<Alert>::start(alerts_config(&dir), fetcher, hub.clone())
        .await
        .unwrap();
    feed.wait_until_warm().await;

    hub.publish("alerts.cap.20240115.CWTO", &alert_url(0), Utc::now()).await;
    wait_for_records(&feed, 1).await;
    hub.publish("alerts.cap.20240115.CWTO", &alert_url(1), Utc::now()).await;

    for _ in 0..200 {
        let alerts = feed.store().snapshot().await;
        if ids(&alerts) == vec![cap::RAINFALL_UPDATE_ID] {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ids(&feed.store().snapshot().await), vec![cap::RAINFALL_UPDATE_ID]);

    // Late redelivery of the superseded warning is ignored.
    let outcome = feed.fetch_now(&alert_url(0)).await.unwrap();
    assert_eq!(
        outcome,
        MergeOutcome::Superseded {
            by: cap::RAINFALL_UPDATE_ID.to_string()
        }
    );
    assert_eq!(feed.store().len().await, 1);
}

#[tokio::test]
async fn test_out_of_area_alerts_are_not_stored() {
    let dir = StateDir::new();
    let fetcher = Arc::new(FixtureFetcher {
        point: Some((45.42, -75.69)),
        ..Default::default()
    });
    fetcher.insert(&alert_url(0), cap::RAINFALL_WARNING.to_string());

    let feed = Feed::<Alert>::start(alerts_config(&dir), fetcher, Arc::new(NotificationHub::new()))
        .await
        .unwrap();

    let err = feed.fetch_now(&alert_url(0)).await.unwrap_err();
    assert_eq!(err.kind(), "out_of_area");
    assert!(feed.store().snapshot().await.is_empty());
}

#[tokio::test]
async fn test_alerts_in_area_are_stored() {
    let dir = StateDir::new();
    let fetcher = Arc::new(FixtureFetcher {
        point: Some(TORONTO),
        ..Default::default()
    });
    fetcher.insert(&alert_url(0), cap::RAINFALL_WARNING.to_string());

    let feed = Feed::<Alert>::start(alerts_config(&dir), fetcher, Arc::new(NotificationHub::new()))
        .await
        .unwrap();

    assert_eq!(feed.fetch_now(&alert_url(0)).await.unwrap(), MergeOutcome::Inserted);
}

fn conditions_feed_config(dir: &StateDir, station: &StationLocation, reject: bool) -> FeedConfig {
    let mut config = FeedConfig::new(station.topic(), dir.file("conditions.txt"));
    config.policy = FeedPolicy {
        reject_intra_period_updates: reject,
    };
    config
}

#[tokio::test]
async fn test_intra_period_resend_refreshes_forecast_only() {
    let dir = StateDir::new();
    let station = StationLocation::new("ON", "s0000458");
    let url = station.document_url(DEFAULT_URL_TEMPLATE);
    let fetcher = Arc::new(FixtureFetcher::default());

    let feed = Feed::<Conditions>::start(
        conditions_feed_config(&dir, &station, true),
        fetcher.clone(),
        Arc::new(NotificationHub::new()),
    )
    .await
    .unwrap();

    fetcher.insert(&url, citypage::toronto());
    assert_eq!(feed.fetch_now(&url).await.unwrap(), MergeOutcome::Inserted);
    let before = feed.store().all().await.remove(0);

    fetcher.insert(
        &url,
        citypage::site_xml(citypage::TORONTO_TOKEN, "-2.0", "5", "Sunny. High minus 1."),
    );
    let outcome = feed.fetch_now(&url).await.unwrap();

    assert_eq!(outcome, MergeOutcome::ForecastRefreshed(citypage::TORONTO_CODE.to_string()));
    let after = feed.store().all().await.remove(0);
    assert_eq!(after.conditions, before.conditions);
    assert_eq!(after.windchill, before.windchill);
    assert_eq!(after.observed, before.observed);
    assert_eq!(
        after.forecast.periods[0].summary.as_deref(),
        Some("Sunny. High minus 1.")
    );

    fetcher.insert(&url, citypage::site_xml("20240115080000", "-2.0", "5", "Sunny."));
    let outcome = feed.fetch_now(&url).await.unwrap();
    assert_eq!(outcome, MergeOutcome::Replaced(citypage::TORONTO_CODE.to_string()));
    assert_eq!(feed.store().len().await, 1);
    assert_eq!(
        feed.store().all().await[0].conditions.temperature.value,
        Some(-2.0)
    );
}

#[tokio::test]
async fn test_reload_detaches_old_subscription() {
    let dir = StateDir::new();
    let hub = Arc::new(NotificationHub::new());
    let fetcher = Arc::new(FixtureFetcher::default());
    let toronto = StationLocation::new("ON", "s0000458");
    let ottawa = StationLocation::new("ON", "s0000430");
    let toronto_url = toronto.document_url(DEFAULT_URL_TEMPLATE);
    let ottawa_url = ottawa.document_url(DEFAULT_URL_TEMPLATE);
    fetcher.insert(&toronto_url, citypage::toronto());
    fetcher.insert(
        &ottawa_url,
        citypage::toronto().replace(citypage::TORONTO_CODE, "s0000430"),
    );

    let feed = Feed::<Conditions>::start(
        conditions_feed_config(&dir, &toronto, false),
        fetcher.clone(),
        hub.clone(),
    )
    .await
    .unwrap();
    feed.fetch_now(&toronto_url).await.unwrap();
    assert_eq!(hub.subscriber_count().await, 1);

    feed.reload(
        ottawa.topic(),
        FeedPolicy {
            reject_intra_period_updates: true,
        },
        Some(ottawa_url.clone()),
    )
    .await
    .unwrap();

    assert_eq!(feed.topic().await, "citypage_weather.ON.s0000430");
    assert!(feed.policy().await.reject_intra_period_updates);
    assert_eq!(hub.subscriber_count().await, 1);
    assert!(feed.is_running().await);

    let stations: Vec<String> = feed.store().all().await.into_iter().map(|c| c.station).collect();
    assert_eq!(stations, vec!["s0000430"]);

    // The old topic has nobody listening any more.
    assert_eq!(hub.publish(&toronto.topic(), &toronto_url, Utc::now()).await, 0);
    assert_eq!(hub.publish(&ottawa.topic(), &ottawa_url, Utc::now()).await, 1);
}

#[tokio::test]
async fn test_restart_after_reload_keeps_one_station() {
    let dir = StateDir::new();
    let fetcher = Arc::new(FixtureFetcher::default());
    let toronto = StationLocation::new("ON", "s0000458");
    let ottawa = StationLocation::new("ON", "s0000430");
    let toronto_url = toronto.document_url(DEFAULT_URL_TEMPLATE);
    let ottawa_url = ottawa.document_url(DEFAULT_URL_TEMPLATE);
    fetcher.insert(&toronto_url, citypage::toronto());
    fetcher.insert(
        &ottawa_url,
        citypage::toronto().replace(citypage::TORONTO_CODE, "s0000430"),
    );

    let first = Feed::<Conditions>::start(
        conditions_feed_config(&dir, &toronto, false),
        fetcher.clone(),
        Arc::new(NotificationHub::new()),
    )
    .await
    .unwrap();
    first
        .reload(ottawa.topic(), FeedPolicy::default(), Some(ottawa_url.clone()))
        .await
        .unwrap();
    first.stop().await;
    assert_eq!(dir.read_lines("conditions.txt"), vec![ottawa_url]);

    // Restarted with the configured station, the replayed station is displaced.
    let second = Feed::<Conditions>::start(
        conditions_feed_config(&dir, &toronto, false),
        fetcher.clone(),
        Arc::new(NotificationHub::new()),
    )
    .await
    .unwrap();
    second.wait_until_warm().await;
    second.fetch_now(&toronto_url).await.unwrap();

    let stations: Vec<String> = second.store().all().await.into_iter().map(|c| c.station).collect();
    assert_eq!(stations, vec!["s0000458"]);

    second.stop().await;
    assert_eq!(dir.read_lines("conditions.txt"), vec![toronto_url]);
}

#[tokio::test]
async fn test_failed_reload_keeps_feed_running() {
    let dir = StateDir::new();
    let hub = Arc::new(NotificationHub::new());
    let fetcher = Arc::new(FixtureFetcher::default());
    let toronto = StationLocation::new("ON", "s0000458");
    let url = toronto.document_url(DEFAULT_URL_TEMPLATE);
    fetcher.insert(&url, citypage::toronto());

    let feed = Feed::<Conditions>::start(
        conditions_feed_config(&dir, &toronto, false),
        fetcher,
        hub.clone(),
    )
    .await
    .unwrap();
    feed.fetch_now(&url).await.unwrap();

    let err = feed
        .reload("citypage_weather..s0000430".to_string(), FeedPolicy::default(), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "configuration");
    assert_eq!(feed.topic().await, toronto.topic());
    assert_eq!(feed.store().len().await, 1);
    assert_eq!(hub.subscriber_count().await, 1);
}

#[tokio::test]
async fn test_invalid_topic_fails_start() {
    let dir = StateDir::new();
    let result = Feed::<Alert>::start(
        FeedConfig::new("alerts..cap", dir.file("alerts.txt")),
        Arc::new(FixtureFetcher::default()),
        Arc::new(NotificationHub::new()),
    )
    .await;

    match result {
        Err(e) => assert_eq!(e.kind(), "configuration"),
        Ok(_) => panic!("feed started with an invalid topic"),
    }
}
