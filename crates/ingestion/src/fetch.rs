//! Document fetchers: resolve a reference into a parsed record.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};

use bulletin_common::{FeedError, FeedResult};

use crate::alert::Alert;
use crate::cap::parse_cap;
use crate::citypage::parse_citypage;
use crate::conditions::Conditions;

/// Resolves a document reference into a record.
#[async_trait]
pub trait DocumentFetcher<R>: Send + Sync {
    /// `replay` is set while rebuilding state from the persistence file.
    async fn fetch(&self, reference: &str, replay: bool) -> FeedResult<R>;
}

/// Raw document retrieval over HTTP.
#[derive(Clone)]
pub struct HttpDocumentSource {
    client: Client,
}

impl HttpDocumentSource {
    pub fn new(timeout: Duration) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bulletin-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, url: &str) -> FeedResult<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::fetch(url, format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| FeedError::fetch(url, e))?;
        debug!(url = %url, size = body.len(), "Fetched document");
        Ok(body)
    }

    /// Fetch a document and decode it as UTF-8.
    pub async fn get_text(&self, url: &str) -> FeedResult<String> {
        let body = self.get(url).await?;
        String::from_utf8(body.to_vec()).map_err(|e| FeedError::parse(url, e))
    }
}

/// Fetches CAP alerts, optionally keeping only those covering a point.
pub struct CapFetcher {
    source: HttpDocumentSource,
    point: Option<(f64, f64)>,
}

impl CapFetcher {
    pub fn new(source: HttpDocumentSource, point: Option<(f64, f64)>) -> Self {
        Self { source, point }
    }
}

/// Keep an alert only if it covers `point`.
pub fn filter_area(alert: Alert, point: Option<(f64, f64)>) -> FeedResult<Alert> {
    match point {
        Some((lat, lon)) if !alert.covers(lat, lon) => Err(FeedError::OutOfArea(alert.identifier)),
        _ => Ok(alert),
    }
}

#[async_trait]
impl DocumentFetcher<Alert> for CapFetcher {
    async fn fetch(&self, reference: &str, replay: bool) -> FeedResult<Alert> {
        let xml = self.source.get_text(reference).await?;
        let alert = parse_cap(&xml, reference)?;
        debug!(identifier = %alert.identifier, replay, "Parsed alert");
        filter_area(alert, self.point)
    }
}

/// Fetches citypage weather reports.
pub struct CitypageFetcher {
    source: HttpDocumentSource,
}

impl CitypageFetcher {
    pub fn new(source: HttpDocumentSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl DocumentFetcher<Conditions> for CitypageFetcher {
    async fn fetch(&self, reference: &str, replay: bool) -> FeedResult<Conditions> {
        let xml = self.source.get_text(reference).await?;
        let conditions = parse_citypage(&xml, reference)?;
        debug!(station = %conditions.station, replay, "Parsed conditions");
        Ok(conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures::cap;

    fn rainfall() -> Alert {
        parse_cap(cap::RAINFALL_WARNING, "https://dd.weather.gc.ca/a.cap").unwrap()
    }

    #[test]
    fn test_filter_keeps_alert_covering_point() {
        assert!(filter_area(rainfall(), Some((43.7, -79.4))).is_ok());
    }

    #[test]
    fn test_filter_rejects_alert_elsewhere() {
        // Ottawa
        let err = filter_area(rainfall(), Some((45.42, -75.69))).unwrap_err();
        assert_eq!(err.kind(), "out_of_area");
    }

    #[test]
    fn test_no_point_keeps_everything() {
        assert!(filter_area(rainfall(), None).is_ok());
    }

    #[test]
    fn test_http_source_builds() {
        assert!(HttpDocumentSource::new(Duration::from_secs(5)).is_ok());
    }
}
