//! CAP 1.2 document parsing.

use bulletin_common::{parse_timestamp, FeedError, FeedResult};
use serde::Deserialize;

use crate::alert::{Alert, AlertArea, Severity, Urgency};

#[derive(Debug, Deserialize)]
struct CapDocument {
    identifier: String,
    #[serde(default)]
    sender: String,
    sent: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "msgType", default)]
    msg_type: String,
    #[serde(default)]
    references: Option<String>,
    #[serde(default)]
    info: Vec<CapInfo>,
}

#[derive(Debug, Deserialize)]
struct CapInfo {
    #[serde(default)]
    language: String,
    #[serde(default)]
    event: String,
    urgency: String,
    severity: String,
    #[serde(default)]
    certainty: String,
    #[serde(default)]
    effective: Option<String>,
    #[serde(default)]
    expires: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    area: Vec<CapArea>,
}

#[derive(Debug, Deserialize)]
struct CapArea {
    #[serde(rename = "areaDesc", default)]
    area_desc: String,
    #[serde(default)]
    polygon: Vec<String>,
}

/// Parse a CAP document fetched from `url`.
///
/// The English `<info>` block is preferred; otherwise the first one is used.
pub fn parse_cap(xml: &str, url: &str) -> FeedResult<Alert> {
    let doc: CapDocument =
        quick_xml::de::from_str(xml).map_err(|e| FeedError::parse(url, e))?;

    let info = doc
        .info
        .iter()
        .find(|i| i.language.to_ascii_lowercase().starts_with("en"))
        .or_else(|| doc.info.first())
        .ok_or_else(|| FeedError::parse(url, "alert has no info block"))?;

    let severity: Severity = info.severity.parse().map_err(|e| FeedError::parse(url, e))?;
    let urgency: Urgency = info.urgency.parse().map_err(|e| FeedError::parse(url, e))?;

    let sent = parse_timestamp(&doc.sent).map_err(|e| FeedError::parse(url, e))?;
    let effective = parse_optional_time(info.effective.as_deref(), url)?;
    let expires = parse_optional_time(info.expires.as_deref(), url)?;

    let areas = info
        .area
        .iter()
        .map(|a| {
            let polygons = a
                .polygon
                .iter()
                .map(|p| parse_polygon(p).map_err(|e| FeedError::parse(url, e)))
                .collect::<FeedResult<Vec<_>>>()?;
            Ok(AlertArea {
                description: a.area_desc.clone(),
                polygons,
            })
        })
        .collect::<FeedResult<Vec<_>>>()?;

    Ok(Alert {
        identifier: doc.identifier.trim().to_string(),
        sender: doc.sender,
        sent,
        status: doc.status,
        msg_type: doc.msg_type,
        references: parse_references(doc.references.as_deref().unwrap_or_default()),
        language: info.language.clone(),
        event: info.event.clone(),
        headline: info.headline.clone(),
        description: info.description.clone(),
        instruction: info.instruction.clone(),
        severity,
        urgency,
        certainty: info.certainty.clone(),
        effective,
        expires,
        areas,
        url: url.to_string(),
    })
}

fn parse_optional_time(
    value: Option<&str>,
    url: &str,
) -> FeedResult<Option<chrono::DateTime<chrono::Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_timestamp(v)
            .map(Some)
            .map_err(|e| FeedError::parse(url, e)),
    }
}

/// Extract identifiers from a CAP `references` value.
///
/// The value is a space-separated list of `sender,identifier,sent` triples;
/// bare identifiers are accepted as well.
pub fn parse_references(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .filter_map(|triple| {
            let mut parts = triple.split(',');
            let first = parts.next()?;
            Some(parts.next().unwrap_or(first).to_string())
        })
        .filter(|id| !id.is_empty())
        .collect()
}

/// Parse a CAP polygon: space-separated `lat,lon` pairs.
fn parse_polygon(value: &str) -> Result<Vec<(f64, f64)>, String> {
    value
        .split_whitespace()
        .map(|pair| {
            let (lat, lon) = pair
                .split_once(',')
                .ok_or_else(|| format!("malformed polygon vertex '{}'", pair))?;
            let lat: f64 = lat
                .parse()
                .map_err(|_| format!("malformed latitude '{}'", lat))?;
            let lon: f64 = lon
                .parse()
                .map_err(|_| format!("malformed longitude '{}'", lon))?;
            Ok((lat, lon))
        })
        .collect()
}
