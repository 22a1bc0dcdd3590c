//! Current-conditions records (citypage weather) and the station location
//! they are fetched for.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use bulletin_common::{FeedError, FeedResult};

use crate::record::{FeedPolicy, FeedRecord, MergeOutcome};
use crate::store::Store;

/// Default document location on the MSC Datamart.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://dd.weather.gc.ca/citypage_weather/xml/{province}/{location}_e.xml";

/// Minimum wind speed (km/h) for a windchill value to be reported.
const WINDCHILL_MIN_WIND_KMH: i64 = 10;
/// Smallest windchill (W/m²) worth reporting.
const WINDCHILL_MIN_REPORTED: f64 = 1200.0;

/// A citypage station to follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationLocation {
    /// Two-letter province code, e.g. `ON`.
    pub province: String,
    /// Site code, e.g. `s0000458`.
    pub location: String,
}

impl StationLocation {
    pub fn new(province: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            province: province.into(),
            location: location.into(),
        }
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.province.len() != 2 || !self.province.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FeedError::Configuration(format!(
                "province must be a two-letter code, got '{}'",
                self.province
            )));
        }
        if self.location.is_empty() || !self.location.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FeedError::Configuration(format!(
                "location must be a site code such as s0000458, got '{}'",
                self.location
            )));
        }
        Ok(())
    }

    /// Notification topic for this station.
    pub fn topic(&self) -> String {
        format!("citypage_weather.{}.{}", self.province, self.location)
    }

    /// Document URL built from a template with `{province}` and `{location}`
    /// placeholders.
    pub fn document_url(&self, template: &str) -> String {
        template
            .replace("{province}", &self.province)
            .replace("{location}", &self.location)
    }
}

/// A measured value with its units as reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: Option<f64>,
    pub units: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pressure {
    pub value: Option<f64>,
    pub units: Option<String>,
    pub tendency: Option<String>,
    pub change: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: Measurement,
    pub gust: Measurement,
    pub direction: Option<String>,
    pub bearing: Option<f64>,
}

/// The observed part of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedConditions {
    pub condition: Option<String>,
    pub icon_code: Option<String>,
    pub temperature: Measurement,
    pub dewpoint: Measurement,
    pub pressure: Pressure,
    pub visibility: Measurement,
    pub relative_humidity: Measurement,
    pub wind: Wind,
}

/// When the station made its observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observed {
    pub utc_time: DateTime<Utc>,
    pub station_time: DateTime<FixedOffset>,
    /// Zone abbreviation, e.g. `EST`.
    pub zone: String,
    /// Hours from UTC.
    pub utc_offset: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiseSet {
    pub sunrise: Option<DateTime<FixedOffset>>,
    pub sunset: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionalNormals {
    pub summary: Option<String>,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

/// One almanac statistic, e.g. `extremeMax` or `normalMin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlmanacEntry {
    pub class: String,
    pub value: Option<f64>,
    pub units: Option<String>,
    pub year: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    /// Display name, e.g. `Tonight`.
    pub name: String,
    pub period: String,
    pub summary: Option<String>,
    pub abbreviated: Option<String>,
    pub icon_code: Option<String>,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

/// Everything in a report that comes from the forecast group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub issued: Option<DateTime<Utc>>,
    pub regional_normals: Option<RegionalNormals>,
    pub periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLong {
    pub lat: f64,
    pub lon: f64,
}

/// A parsed citypage weather report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    /// Site code; one live record per station.
    pub station: String,
    pub city: String,
    /// Station-local observation stamp. Two reports with the same token
    /// describe the same observation period.
    pub condition_id: Option<String>,
    pub observed: Option<Observed>,
    pub conditions: ObservedConditions,
    /// W/m², 0 when not applicable.
    pub windchill: i32,
    pub rise_set: RiseSet,
    pub almanac: Vec<AlmanacEntry>,
    pub forecast: Forecast,
    pub station_lat_long: Option<LatLong>,
    pub url: String,
}

impl FeedRecord for Conditions {
    const FEED: &'static str = "conditions";

    fn identifier(&self) -> &str {
        &self.station
    }

    fn supersedes(&self) -> &[String] {
        &[]
    }

    fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.observed.as_ref().map(|o| o.utc_time)
    }

    fn valid_until(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn source_reference(&self) -> &str {
        &self.url
    }

    /// A conditions feed holds one report: a report from another station
    /// displaces whatever is live.
    fn reconcile(store: &mut Store<Self>, incoming: Self, policy: &FeedPolicy) -> MergeOutcome {
        let displaced = store.retain(|r| r.station == incoming.station);

        if policy.reject_intra_period_updates {
            if let Some(current) = store.get_mut(&incoming.station) {
                if current.condition_id.is_some() && current.condition_id == incoming.condition_id {
                    current.forecast = incoming.forecast;
                    return MergeOutcome::ForecastRefreshed(current.station.clone());
                }
            }
        }

        match (store.merge(incoming), displaced.into_iter().next()) {
            (MergeOutcome::Inserted, Some(previous)) => MergeOutcome::Replaced(previous),
            (outcome, _) => outcome,
        }
    }
}

/// Windchill in W/m² from air temperature (°C) and wind speed (km/h).
///
/// Returns 0 above freezing, below the wind threshold, when either input is
/// missing, or when the value rounds to less than the reporting minimum.
/// Wind speed is truncated to whole km/h; the result is rounded to the
/// nearest 50.
pub fn windchill(temperature: Option<f64>, wind_kmh: Option<f64>) -> i32 {
    let (Some(temperature), Some(wind_kmh)) = (temperature, wind_kmh) else {
        return 0;
    };
    if temperature > 0.0 {
        return 0;
    }

    let wind = wind_kmh.trunc() as i64;
    if wind < WINDCHILL_MIN_WIND_KMH {
        return 0;
    }

    let ms = wind as f64 / 3.6;
    let raw = ((12.1452 + 11.6222 * ms.sqrt() - 1.16222 * ms) * (33.0 - temperature)).floor();
    let rounded = (raw / 50.0).round() * 50.0;

    if rounded >= WINDCHILL_MIN_REPORTED {
        rounded as i32
    } else {
        0
    }
}

/// Parse citypage coordinates such as `43.74N` / `79.37W`.
///
/// North and east are positive.
pub fn parse_lat_long(lat: &str, lon: &str) -> Option<LatLong> {
    Some(LatLong {
        lat: parse_hemisphere(lat, 'N', 'S')?,
        lon: parse_hemisphere(lon, 'E', 'W')?,
    })
}

fn parse_hemisphere(value: &str, positive: char, negative: char) -> Option<f64> {
    let value = value.trim();
    let (split, suffix) = value.char_indices().last()?;
    let suffix = suffix.to_ascii_uppercase();
    let number: f64 = value[..split].trim().parse().ok()?;
    if suffix == positive {
        Some(number)
    } else if suffix == negative {
        Some(-number)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn report(station: &str, token: &str, temperature: f64, forecast: &str) -> Conditions {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let utc_time = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        Conditions {
            station: station.to_string(),
            city: "Toronto".to_string(),
            condition_id: Some(token.to_string()),
            observed: Some(Observed {
                utc_time,
                station_time: utc_time.with_timezone(&offset),
                zone: "EST".to_string(),
                utc_offset: -5.0,
            }),
            conditions: ObservedConditions {
                condition: Some("Light Snow".to_string()),
                temperature: Measurement {
                    value: Some(temperature),
                    units: Some("C".to_string()),
                },
                ..Default::default()
            },
            windchill: 0,
            rise_set: RiseSet::default(),
            almanac: Vec::new(),
            forecast: Forecast {
                issued: None,
                regional_normals: None,
                periods: vec![ForecastPeriod {
                    name: "Today".to_string(),
                    period: "Monday".to_string(),
                    summary: Some(forecast.to_string()),
                    abbreviated: None,
                    icon_code: None,
                    high: None,
                    low: None,
                }],
            },
            station_lat_long: None,
            url: format!("https://dd.weather.gc.ca/citypage_weather/xml/ON/{}_e.xml", station),
        }
    }

    const REJECT: FeedPolicy = FeedPolicy {
        reject_intra_period_updates: true,
    };

    #[test]
    fn test_windchill_reference_values() {
        let cases = [
            (-2.0, 15.0, 0),
            (-5.0, 20.0, 1250),
            (-10.0, 25.0, 1500),
            (-15.0, 12.0, 1400),
            (-20.0, 30.0, 1900),
            (-25.0, 60.0, 2350),
            (-15.0, 30.0, 1750),
        ];
        for (t, w, expected) in cases {
            assert_eq!(windchill(Some(t), Some(w)), expected, "t={} w={}", t, w);
        }
    }

    #[test]
    fn test_windchill_not_applicable() {
        assert_eq!(windchill(Some(-5.0), Some(5.0)), 0);
        assert_eq!(windchill(Some(-5.0), Some(9.9)), 0);
        assert_eq!(windchill(Some(0.5), Some(15.0)), 0);
        assert_eq!(windchill(Some(1.0), Some(50.0)), 0);
        assert_eq!(windchill(None, Some(50.0)), 0);
        assert_eq!(windchill(Some(-30.0), None), 0);
    }

    #[test]
    fn test_windchill_values_are_multiples_of_fifty() {
        for t in -40..0 {
            for w in 10..80 {
                let wc = windchill(Some(t as f64), Some(w as f64));
                assert_eq!(wc % 50, 0);
                assert!(wc == 0 || wc >= 1200);
            }
        }
    }

    #[test]
    fn test_parse_lat_long_hemispheres() {
        let ll = parse_lat_long("43.74N", "79.37W").unwrap();
        assert_eq!(ll.lat, 43.74);
        assert_eq!(ll.lon, -79.37);

        let ll = parse_lat_long("33.9S", "151.2E").unwrap();
        assert_eq!(ll.lat, -33.9);
        assert_eq!(ll.lon, 151.2);

        assert!(parse_lat_long("43.74", "79.37W").is_none());
        assert!(parse_lat_long("", "79.37W").is_none());
        assert!(parse_lat_long("43.74N", "west").is_none());
    }

    #[test]
    fn test_station_location_topic_and_url() {
        let loc = StationLocation::new("ON", "s0000458");
        assert!(loc.validate().is_ok());
        assert_eq!(loc.topic(), "citypage_weather.ON.s0000458");
        assert_eq!(
            loc.document_url(DEFAULT_URL_TEMPLATE),
            "https://dd.weather.gc.ca/citypage_weather/xml/ON/s0000458_e.xml"
        );
    }

    #[test]
    fn test_station_location_validation() {
        for (province, location) in [("", "s0000458"), ("Ontario", "s0000458"), ("ON", ""), ("ON", "../etc")] {
            let err = StationLocation::new(province, location).validate().unwrap_err();
            assert_eq!(err.kind(), "configuration");
        }
    }

    #[test]
    fn test_intra_period_update_refreshes_only_forecast() {
        let mut store = Store::new();
        let first = report("s0000458", "20240115070000", -15.0, "Flurries.");
        Conditions::reconcile(&mut store, first.clone(), &REJECT);

        let resend = report("s0000458", "20240115070000", -3.0, "Sunny.");
        let outcome = Conditions::reconcile(&mut store, resend, &REJECT);

        assert_eq!(outcome, MergeOutcome::ForecastRefreshed("s0000458".to_string()));
        let stored = store.get("s0000458").unwrap();
        assert_eq!(stored.conditions, first.conditions);
        assert_eq!(stored.observed, first.observed);
        assert_eq!(stored.forecast.periods[0].summary.as_deref(), Some("Sunny."));
    }

    #[test]
    fn test_new_period_replaces_record() {
        let mut store = Store::new();
        Conditions::reconcile(&mut store, report("s0000458", "20240115070000", -15.0, "a"), &REJECT);

        let outcome = Conditions::reconcile(
            &mut store,
            report("s0000458", "20240115080000", -14.0, "b"),
            &REJECT,
        );

        assert_eq!(outcome, MergeOutcome::Replaced("s0000458".to_string()));
        assert_eq!(store.len(), 1);
        let stored = store.get("s0000458").unwrap();
        assert_eq!(stored.conditions.temperature.value, Some(-14.0));
    }

    #[test]
    fn test_same_period_replaces_when_policy_off() {
        let mut store = Store::new();
        let policy = FeedPolicy::default();
        Conditions::reconcile(&mut store, report("s0000458", "t", -15.0, "a"), &policy);

        let outcome = Conditions::reconcile(&mut store, report("s0000458", "t", -3.0, "b"), &policy);

        assert_eq!(outcome, MergeOutcome::Replaced("s0000458".to_string()));
        assert_eq!(store.get("s0000458").unwrap().conditions.temperature.value, Some(-3.0));
    }

    #[test]
    fn test_other_station_displaces_live_report() {
        let mut store = Store::new();
        Conditions::reconcile(&mut store, report("s0000430", "20240115070000", -20.0, "a"), &REJECT);

        // Same observation stamp, different station: not an intra-period resend.
        let outcome = Conditions::reconcile(
            &mut store,
            report("s0000458", "20240115070000", -15.0, "b"),
            &REJECT,
        );

        assert_eq!(outcome, MergeOutcome::Replaced("s0000430".to_string()));
        assert_eq!(store.len(), 1);
        assert!(store.get("s0000430").is_none());
        assert_eq!(store.get("s0000458").unwrap().conditions.temperature.value, Some(-15.0));
    }

    #[test]
    fn test_missing_token_never_matches() {
        let mut store = Store::new();
        let mut first = report("s0000458", "t", -15.0, "a");
        first.condition_id = None;
        Conditions::reconcile(&mut store, first, &REJECT);

        let mut second = report("s0000458", "t", -3.0, "b");
        second.condition_id = None;
        let outcome = Conditions::reconcile(&mut store, second, &REJECT);

        assert_eq!(outcome.label(), "replaced");
    }
}
