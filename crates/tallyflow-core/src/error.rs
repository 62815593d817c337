//! Error types for Tallyflow Core

use thiserror::Error;

/// Errors surfaced by the fetch and metrics layers.
///
/// The type is `Clone` so that one settled fetch can be handed to every
/// caller that joined the same in-flight request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Rate limit exceeded{}", retry_after_secs.map(|s| format!(": retry after {}s", s)).unwrap_or_default())]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics computation failed: {0}")]
    Metrics(String),

    #[error("Metrics worker unavailable")]
    WorkerUnavailable,
}

impl Error {
    /// Whether a retry can reasonably succeed where this attempt failed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Cancelled | Error::InvalidRequest(_) | Error::Config(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Short label used for metric dimensions
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Backend(_) => "backend",
            Error::RateLimitExceeded { .. } => "rate_limit",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::WorkerUnavailable => "worker_unavailable",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = Error::Backend("502 bad gateway".to_string());
        assert_eq!(err.to_string(), "Backend error: 502 bad gateway");

        let err = Error::RateLimitExceeded {
            retry_after_secs: Some(30),
        };
        assert!(err.to_string().contains("30s"));

        let err = Error::RateLimitExceeded {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "Rate limit exceeded");

        assert_eq!(Error::Timeout(1500).to_string(), "Request timeout after 1500ms");
        assert_eq!(Error::Cancelled.to_string(), "Request cancelled");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Backend("boom".into()).is_retryable());
        assert!(Error::Timeout(10).is_retryable());
        assert!(
            Error::RateLimitExceeded {
                retry_after_secs: None
            }
            .is_retryable()
        );
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::InvalidRequest("bad".into()).is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Backend("cancelled".into()).is_cancelled());
        assert_eq!(Error::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
