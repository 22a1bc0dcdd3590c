//! Citypage weather XML parsing.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;

use bulletin_common::{offset_from_hours, parse_timestamp, FeedError, FeedResult};

use crate::conditions::{
    parse_lat_long, windchill, AlmanacEntry, Conditions, Forecast, ForecastPeriod, Measurement,
    Observed, ObservedConditions, Pressure, RegionalNormals, RiseSet, Wind,
};

#[derive(Debug, Deserialize)]
struct SiteData {
    location: Option<XmlLocation>,
    #[serde(rename = "currentConditions")]
    current_conditions: Option<XmlCurrentConditions>,
    #[serde(rename = "forecastGroup")]
    forecast_group: Option<XmlForecastGroup>,
    #[serde(rename = "riseSet")]
    rise_set: Option<XmlRiseSet>,
    almanac: Option<XmlAlmanac>,
}

#[derive(Debug, Deserialize)]
struct XmlLocation {
    name: XmlName,
}

#[derive(Debug, Deserialize)]
struct XmlName {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "@lat")]
    lat: Option<String>,
    #[serde(rename = "@lon")]
    lon: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct XmlDateTime {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@zone", default)]
    zone: String,
    #[serde(rename = "@UTCOffset", default)]
    utc_offset: String,
    #[serde(rename = "timeStamp")]
    time_stamp: Option<String>,
}

impl XmlDateTime {
    fn is_utc(&self) -> bool {
        self.zone.eq_ignore_ascii_case("UTC")
    }
}

/// Element with optional text and a `units` attribute.
#[derive(Debug, Default, Deserialize)]
struct XmlValue {
    #[serde(rename = "@units")]
    units: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

impl XmlValue {
    fn measurement(&self) -> Measurement {
        Measurement {
            value: number(self.text.as_deref()),
            units: self.units.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct XmlClassValue {
    #[serde(rename = "@class", default)]
    class: String,
    #[serde(rename = "@units")]
    units: Option<String>,
    #[serde(rename = "@year")]
    year: Option<String>,
    #[serde(rename = "@period")]
    period: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlPressure {
    #[serde(rename = "@units")]
    units: Option<String>,
    #[serde(rename = "@tendency")]
    tendency: Option<String>,
    #[serde(rename = "@change")]
    change: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlWind {
    speed: Option<XmlValue>,
    gust: Option<XmlValue>,
    direction: Option<String>,
    bearing: Option<XmlValue>,
}

#[derive(Debug, Deserialize)]
struct XmlCurrentConditions {
    #[serde(rename = "dateTime", default)]
    date_time: Vec<XmlDateTime>,
    condition: Option<String>,
    #[serde(rename = "iconCode")]
    icon_code: Option<XmlValue>,
    temperature: Option<XmlValue>,
    dewpoint: Option<XmlValue>,
    pressure: Option<XmlPressure>,
    visibility: Option<XmlValue>,
    #[serde(rename = "relativeHumidity")]
    relative_humidity: Option<XmlValue>,
    wind: Option<XmlWind>,
}

#[derive(Debug, Deserialize)]
struct XmlForecastGroup {
    #[serde(rename = "dateTime", default)]
    date_time: Vec<XmlDateTime>,
    #[serde(rename = "regionalNormals")]
    regional_normals: Option<XmlTemperatures>,
    #[serde(default)]
    forecast: Vec<XmlForecast>,
}

#[derive(Debug, Deserialize)]
struct XmlTemperatures {
    #[serde(rename = "textSummary")]
    text_summary: Option<String>,
    #[serde(default)]
    temperature: Vec<XmlClassValue>,
}

impl XmlTemperatures {
    fn class(&self, class: &str) -> Option<f64> {
        self.temperature
            .iter()
            .find(|t| t.class == class)
            .and_then(|t| number(t.text.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
struct XmlForecast {
    period: XmlPeriod,
    #[serde(rename = "textSummary")]
    text_summary: Option<String>,
    #[serde(rename = "abbreviatedForecast")]
    abbreviated_forecast: Option<XmlAbbreviated>,
    temperatures: Option<XmlTemperatures>,
}

#[derive(Debug, Deserialize)]
struct XmlPeriod {
    #[serde(rename = "@textForecastName", default)]
    text_forecast_name: String,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct XmlAbbreviated {
    #[serde(rename = "iconCode")]
    icon_code: Option<XmlValue>,
    #[serde(rename = "textSummary")]
    text_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlRiseSet {
    #[serde(rename = "dateTime", default)]
    date_time: Vec<XmlDateTime>,
}

#[derive(Debug, Deserialize)]
struct XmlAlmanac {
    #[serde(default)]
    temperature: Vec<XmlClassValue>,
    #[serde(default)]
    precipitation: Vec<XmlClassValue>,
}

/// Parse a citypage weather document fetched from `url`.
pub fn parse_citypage(xml: &str, url: &str) -> FeedResult<Conditions> {
    let doc: SiteData = quick_xml::de::from_str(xml).map_err(|e| FeedError::parse(url, e))?;

    let name = doc
        .location
        .map(|l| l.name)
        .ok_or_else(|| FeedError::parse(url, "document has no location"))?;

    let station_lat_long = match (name.lat.as_deref(), name.lon.as_deref()) {
        (Some(lat), Some(lon)) => parse_lat_long(lat, lon),
        _ => None,
    };

    let (condition_id, observed, conditions) = match doc.current_conditions {
        Some(current) => {
            let token = station_stamp(&current.date_time);
            let observed = observation(&current.date_time, url)?;
            (token, observed, observed_conditions(&current))
        }
        None => (None, None, ObservedConditions::default()),
    };

    let windchill = windchill(conditions.temperature.value, conditions.wind.speed.value);

    let forecast = match doc.forecast_group {
        Some(group) => forecast(group, url)?,
        None => Forecast::default(),
    };

    let rise_set = match doc.rise_set {
        Some(rs) => rise_set(&rs.date_time, url)?,
        None => RiseSet::default(),
    };

    let almanac = doc
        .almanac
        .map(|a| {
            a.temperature
                .into_iter()
                .chain(a.precipitation)
                .map(|v| AlmanacEntry {
                    value: number(v.text.as_deref()),
                    class: v.class,
                    units: v.units,
                    year: v.year,
                    period: v.period,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Conditions {
        station: name.code,
        city: name.text.trim().to_string(),
        condition_id,
        observed,
        conditions,
        windchill,
        rise_set,
        almanac,
        forecast,
        station_lat_long,
        url: url.to_string(),
    })
}

/// The station-local observation stamp, falling back to the second and then
/// the first `dateTime` entry.
fn station_stamp(date_times: &[XmlDateTime]) -> Option<String> {
    date_times
        .iter()
        .find(|dt| !dt.is_utc())
        .or_else(|| date_times.get(1))
        .or_else(|| date_times.first())
        .and_then(|dt| dt.time_stamp.as_deref())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn observation(date_times: &[XmlDateTime], url: &str) -> FeedResult<Option<Observed>> {
    let Some(utc) = date_times.iter().find(|dt| dt.is_utc()) else {
        return Ok(None);
    };
    let Some(utc_time) = timestamp(utc.time_stamp.as_deref(), url)? else {
        return Ok(None);
    };

    let local = date_times.iter().find(|dt| !dt.is_utc()).unwrap_or(utc);
    let offset = offset_from_hours(&local.utc_offset).map_err(|e| FeedError::parse(url, e))?;
    let utc_offset = offset.local_minus_utc() as f64 / 3600.0;

    Ok(Some(Observed {
        utc_time,
        station_time: utc_time.with_timezone(&offset),
        zone: local.zone.clone(),
        utc_offset,
    }))
}

fn observed_conditions(current: &XmlCurrentConditions) -> ObservedConditions {
    let wind = current
        .wind
        .as_ref()
        .map(|w| Wind {
            speed: w.speed.as_ref().map(XmlValue::measurement).unwrap_or_default(),
            gust: w.gust.as_ref().map(XmlValue::measurement).unwrap_or_default(),
            direction: text(w.direction.as_deref()),
            bearing: w.bearing.as_ref().and_then(|b| number(b.text.as_deref())),
        })
        .unwrap_or_default();

    let pressure = current
        .pressure
        .as_ref()
        .map(|p| Pressure {
            value: number(p.text.as_deref()),
            units: p.units.clone(),
            tendency: text(p.tendency.as_deref()),
            change: number(p.change.as_deref()),
        })
        .unwrap_or_default();

    let measure = |v: &Option<XmlValue>| v.as_ref().map(XmlValue::measurement).unwrap_or_default();

    ObservedConditions {
        condition: text(current.condition.as_deref()),
        icon_code: current.icon_code.as_ref().and_then(|i| text(i.text.as_deref())),
        temperature: measure(&current.temperature),
        dewpoint: measure(&current.dewpoint),
        pressure,
        visibility: measure(&current.visibility),
        relative_humidity: measure(&current.relative_humidity),
        wind,
    }
}

fn forecast(group: XmlForecastGroup, url: &str) -> FeedResult<Forecast> {
    let issued = match group.date_time.iter().find(|dt| dt.is_utc()) {
        Some(dt) => timestamp(dt.time_stamp.as_deref(), url)?,
        None => None,
    };

    let regional_normals = group.regional_normals.map(|n| RegionalNormals {
        high: n.class("high"),
        low: n.class("low"),
        summary: text(n.text_summary.as_deref()),
    });

    let periods = group
        .forecast
        .into_iter()
        .map(|f| {
            let (high, low) = f
                .temperatures
                .as_ref()
                .map(|t| (t.class("high"), t.class("low")))
                .unwrap_or((None, None));
            let (abbreviated, icon_code) = f
                .abbreviated_forecast
                .map(|a| {
                    (
                        text(a.text_summary.as_deref()),
                        a.icon_code.and_then(|i| text(i.text.as_deref())),
                    )
                })
                .unwrap_or((None, None));
            ForecastPeriod {
                name: f.period.text_forecast_name,
                period: f.period.text.trim().to_string(),
                summary: text(f.text_summary.as_deref()),
                abbreviated,
                icon_code,
                high,
                low,
            }
        })
        .collect();

    Ok(Forecast {
        issued,
        regional_normals,
        periods,
    })
}

/// Sunrise and sunset in station-local time.
fn rise_set(date_times: &[XmlDateTime], url: &str) -> FeedResult<RiseSet> {
    let event = |name: &str| -> FeedResult<Option<DateTime<FixedOffset>>> {
        let utc = date_times.iter().find(|dt| dt.name == name && dt.is_utc());
        let local = date_times.iter().find(|dt| dt.name == name && !dt.is_utc());
        let Some(utc) = utc else {
            return Ok(None);
        };
        let Some(at) = timestamp(utc.time_stamp.as_deref(), url)? else {
            return Ok(None);
        };
        match local {
            Some(local) => {
                let offset =
                    offset_from_hours(&local.utc_offset).map_err(|e| FeedError::parse(url, e))?;
                Ok(Some(at.with_timezone(&offset)))
            }
            None => Ok(Some(at.into())),
        }
    };

    Ok(RiseSet {
        sunrise: event("sunrise")?,
        sunset: event("sunset")?,
    })
}

fn timestamp(value: Option<&str>, url: &str) -> FeedResult<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_timestamp(v)
            .map(Some)
            .map_err(|e| FeedError::parse(url, e)),
    }
}

fn number(value: Option<&str>) -> Option<f64> {
    value.map(str::trim).and_then(|v| v.parse().ok())
}

fn text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
