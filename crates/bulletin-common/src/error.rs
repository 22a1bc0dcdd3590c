//! Error types for the bulletin feeds.

use thiserror::Error;

/// Result type alias using FeedError.
pub type FeedResult<T> = Result<T, FeedError>;

/// Primary error type for feed ingestion.
///
/// Everything except `Configuration` is local to a single notification or
/// write and never stops the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    // === Notification bus ===
    #[error("Notification transport error: {0}")]
    Transport(String),

    // === Per-document errors ===
    #[error("Failed to fetch {reference}: {message}")]
    Fetch { reference: String, message: String },

    #[error("Failed to parse {reference}: {message}")]
    Parse { reference: String, message: String },

    #[error("Bulletin {0} does not cover the configured location")]
    OutOfArea(String),

    #[error("Discarded {0}: the feed was reloaded while it was in flight")]
    Detached(String),

    // === State ===
    #[error("Failed to persist feed state: {0}")]
    Persistence(String),

    // === Setup ===
    #[error("Invalid feed configuration: {0}")]
    Configuration(String),
}

impl FeedError {
    pub fn fetch(reference: impl Into<String>, message: impl ToString) -> Self {
        FeedError::Fetch {
            reference: reference.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(reference: impl Into<String>, message: impl ToString) -> Self {
        FeedError::Parse {
            reference: reference.into(),
            message: message.to_string(),
        }
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Transport(_) => "transport",
            FeedError::Fetch { .. } => "fetch",
            FeedError::Parse { .. } => "parse",
            FeedError::OutOfArea(_) => "out_of_area",
            FeedError::Detached(_) => "detached",
            FeedError::Persistence(_) => "persistence",
            FeedError::Configuration(_) => "configuration",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            FeedError::Configuration(_) => 400,
            FeedError::OutOfArea(_) => 404,
            FeedError::Detached(_) => 409,
            FeedError::Fetch { .. } | FeedError::Transport(_) => 502,
            FeedError::Parse { .. } => 422,
            FeedError::Persistence(_) => 500,
        }
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_reference() {
        let err = FeedError::fetch("https://dd.example/alert.cap", "connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to fetch https://dd.example/alert.cap: connection refused"
        );
        assert_eq!(err.kind(), "fetch");
    }

    #[test]
    fn test_configuration_is_client_error() {
        let err = FeedError::Configuration("missing province".to_string());
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_io_error_maps_to_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: FeedError = io.into();
        assert_eq!(err.kind(), "persistence");
    }
}
