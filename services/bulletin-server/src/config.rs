//! Service configuration loaded from `config/bulletins.yaml`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use bulletin_common::{FeedError, FeedResult};
use ingestion::{FeedPolicy, StationLocation, TopicPattern, ALERTS_TOPIC, DEFAULT_URL_TEMPLATE};

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BulletinConfig {
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub conditions: ConditionsConfig,
    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Seconds between pushes on the live streams.
    #[serde(default = "default_stream_interval_secs")]
    pub stream_interval_secs: u64,
    /// Fetches in flight while replaying persisted state.
    #[serde(default = "default_replay_concurrency")]
    pub replay_concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_alerts_topic")]
    pub topic: String,
    /// Only keep alerts covering this point, when both are set.
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_province")]
    pub province: String,
    #[serde(default = "default_location")]
    pub location: String,
    /// Keep the observed values when a station re-sends the same
    /// observation period; only the forecast is refreshed.
    #[serde(default)]
    pub reject_in_hour_updates: bool,
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

fn default_enabled() -> bool {
    true
}

fn default_alerts_topic() -> String {
    ALERTS_TOPIC.to_string()
}

fn default_province() -> String {
    "ON".to_string()
}

fn default_location() -> String {
    "s0000458".to_string()
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

fn default_sweep_interval_secs() -> u64 {
    15 * 60
}

fn default_stream_interval_secs() -> u64 {
    5
}

fn default_replay_concurrency() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            topic: default_alerts_topic(),
            lat: None,
            lon: None,
        }
    }
}

impl Default for ConditionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            province: default_province(),
            location: default_location(),
            reject_in_hour_updates: false,
            url_template: default_url_template(),
        }
    }
}

impl Default for BulletinConfig {
    fn default() -> Self {
        Self {
            alerts: AlertsConfig::default(),
            conditions: ConditionsConfig::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stream_interval_secs: default_stream_interval_secs(),
            replay_concurrency: default_replay_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl BulletinConfig {
    /// Load and validate the configuration file. A missing file means
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(
            path = %path.display(),
            alerts = config.alerts.enabled,
            conditions = config.conditions.enabled,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Invalid YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.sweep_interval_secs == 0 || self.stream_interval_secs == 0 {
            return Err(FeedError::Configuration(
                "sweep and stream intervals must be positive".to_string(),
            ));
        }
        if self.replay_concurrency == 0 {
            return Err(FeedError::Configuration(
                "replay_concurrency must be at least 1".to_string(),
            ));
        }
        if self.alerts.enabled {
            let _: TopicPattern = self.alerts.topic.parse()?;
        }
        self.alerts.point()?;
        if self.conditions.enabled {
            self.conditions.station().validate()?;
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_secs(self.stream_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl AlertsConfig {
    /// The area filter point, if configured.
    pub fn point(&self) -> FeedResult<Option<(f64, f64)>> {
        match (self.lat, self.lon) {
            (None, None) => Ok(None),
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(FeedError::Configuration(format!(
                        "alert point ({}, {}) is out of range",
                        lat, lon
                    )));
                }
                Ok(Some((lat, lon)))
            }
            _ => Err(FeedError::Configuration(
                "alerts.lat and alerts.lon must be set together".to_string(),
            )),
        }
    }
}

impl ConditionsConfig {
    pub fn station(&self) -> StationLocation {
        StationLocation::new(&self.province, &self.location)
    }

    pub fn policy(&self) -> FeedPolicy {
        FeedPolicy {
            reject_intra_period_updates: self.reject_in_hour_updates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = BulletinConfig::from_yaml("{}").unwrap();
        assert!(config.alerts.enabled);
        assert_eq!(config.alerts.topic, "alerts.cap.#");
        assert_eq!(config.conditions.station().topic(), "citypage_weather.ON.s0000458");
        assert_eq!(config.sweep_interval(), Duration::from_secs(900));
        assert_eq!(config.stream_interval(), Duration::from_secs(5));
        assert!(!config.conditions.policy().reject_intra_period_updates);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
alerts:
  enabled: true
  lat: 45.42
  lon: -75.69
conditions:
  province: QC
  location: s0000635
  reject_in_hour_updates: true
sweep_interval_secs: 60
stream_interval_secs: 2
replay_concurrency: 8
"#;
        let config = BulletinConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.alerts.point().unwrap(), Some((45.42, -75.69)));
        assert_eq!(config.conditions.station(), StationLocation::new("QC", "s0000635"));
        assert!(config.conditions.policy().reject_intra_period_updates);
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.replay_concurrency, 8);
    }

    #[test]
    fn test_half_a_point_is_rejected() {
        let err = BulletinConfig::from_yaml("alerts:\n  lat: 45.0\n").unwrap_err();
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn test_bad_station_is_rejected() {
        assert!(BulletinConfig::from_yaml("conditions:\n  province: Ontario\n").is_err());
        // Disabled feeds are not validated.
        assert!(BulletinConfig::from_yaml("conditions:\n  enabled: false\n  province: Ontario\n").is_ok());
    }

    #[test]
    fn test_bad_alerts_topic_is_rejected() {
        let err = BulletinConfig::from_yaml("alerts:\n  topic: \"alerts..cap\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid topic pattern"));
        assert!(BulletinConfig::from_yaml("alerts:\n  topic: \"alerts.*.#\"\n").is_ok());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(BulletinConfig::from_yaml("stream_interval_secs: 0\n").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BulletinConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.replay_concurrency, 4);
    }
}
