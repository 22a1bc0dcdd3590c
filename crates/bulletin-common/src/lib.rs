//! Common types and utilities shared across the weather bulletin crates.

pub mod error;
pub mod time;

pub use error::{FeedError, FeedResult};
pub use time::{offset_from_hours, parse_timestamp, TimeParseError};
