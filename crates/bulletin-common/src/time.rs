//! Timestamp parsing for bulletin documents.
//!
//! CAP documents carry RFC 3339 timestamps (often with a `-00:00` offset),
//! citypage documents carry compact `YYYYMMDDHHMMSS` stamps in UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid UTC offset: {0}")]
    InvalidOffset(String),
}

/// Parse a bulletin timestamp into UTC.
///
/// Accepts RFC 3339, a naive `%Y-%m-%dT%H:%M:%S` (assumed UTC) and the
/// compact `%Y%m%d%H%M%S` / `%Y%m%d%H%M` forms.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if s.len() == 14 && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S") {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if s.len() == 12 && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M") {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// Build a fixed offset from a whole-hour (or fractional, e.g. `-3.5`) UTC offset string.
pub fn offset_from_hours(s: &str) -> Result<FixedOffset, TimeParseError> {
    let hours: f64 = s
        .trim()
        .parse()
        .map_err(|_| TimeParseError::InvalidOffset(s.to_string()))?;
    let seconds = (hours * 3600.0).round() as i32;
    FixedOffset::east_opt(seconds).ok_or_else(|| TimeParseError::InvalidOffset(s.to_string()))
}
