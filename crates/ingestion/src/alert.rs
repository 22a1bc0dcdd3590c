//! Weather alert records (CAP bulletins) and their presentation priority.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::FeedRecord;

/// CAP severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Unknown,
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl FromStr for Severity {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(Severity::Unknown),
            "MINOR" => Ok(Severity::Minor),
            "MODERATE" => Ok(Severity::Moderate),
            "SEVERE" => Ok(Severity::Severe),
            "EXTREME" => Ok(Severity::Extreme),
            _ => Err(UnknownToken {
                field: "severity",
                token: s.to_string(),
            }),
        }
    }
}

/// CAP urgency, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    Unknown,
    Past,
    Future,
    Expected,
    Immediate,
}

impl Urgency {
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl FromStr for Urgency {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(Urgency::Unknown),
            "PAST" => Ok(Urgency::Past),
            "FUTURE" => Ok(Urgency::Future),
            "EXPECTED" => Ok(Urgency::Expected),
            "IMMEDIATE" => Ok(Urgency::Immediate),
            _ => Err(UnknownToken {
                field: "urgency",
                token: s.to_string(),
            }),
        }
    }
}

/// A severity or urgency token outside the CAP vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised {field} '{token}'")]
pub struct UnknownToken {
    pub field: &'static str,
    pub token: String,
}

/// A geographic area an alert applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertArea {
    pub description: String,
    /// Closed rings of `(lat, lon)` vertices.
    #[serde(default)]
    pub polygons: Vec<Vec<(f64, f64)>>,
}

impl AlertArea {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.polygons.iter().any(|ring| point_in_ring(ring, lat, lon))
    }
}

/// Ray casting; points on an edge may land on either side.
fn point_in_ring(ring: &[(f64, f64)], lat: f64, lon: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (lat_i, lon_i) = ring[i];
        let (lat_j, lon_j) = ring[j];
        if (lat_i > lat) != (lat_j > lat)
            && lon < (lon_j - lon_i) * (lat - lat_i) / (lat_j - lat_i) + lon_i
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// A parsed CAP alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub identifier: String,
    pub sender: String,
    /// Issuance time.
    pub sent: DateTime<Utc>,
    pub status: String,
    pub msg_type: String,
    /// Identifiers of the bulletins this one updates or cancels.
    pub references: Vec<String>,
    pub language: String,
    pub event: String,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub severity: Severity,
    pub urgency: Urgency,
    pub certainty: String,
    pub effective: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub areas: Vec<AlertArea>,
    /// Where the CAP document was fetched from.
    pub url: String,
}

impl Alert {
    /// Whether the alert covers a point. Alerts without polygons are treated
    /// as covering everywhere.
    pub fn covers(&self, lat: f64, lon: f64) -> bool {
        let has_polygons = self.areas.iter().any(|a| !a.polygons.is_empty());
        !has_polygons || self.areas.iter().any(|a| a.contains(lat, lon))
    }
}

impl FeedRecord for Alert {
    const FEED: &'static str = "alerts";

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn supersedes(&self) -> &[String] {
        &self.references
    }

    fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.effective.or(Some(self.sent))
    }

    fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    fn source_reference(&self) -> &str {
        &self.url
    }

    fn priority_cmp(&self, other: &Self) -> Ordering {
        self.severity
            .cmp(&other.severity)
            .then(self.urgency.cmp(&other.urgency))
            .then(self.sent.cmp(&other.sent))
    }
}
