//! Error taxonomy for listing lookups.

use std::time::Duration;
use thiserror::Error;

/// Every way a listing lookup can fail.
#[derive(Debug, Error)]
pub enum ListingError {
    /// Empty or malformed mint, rejected before anything is queued.
    #[error("invalid mint: {0}")]
    InvalidInput(String),

    /// Upstream answered with a non-2xx status.
    #[error("API error: {status}")]
    UpstreamHttp { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete within its timeout and was aborted.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP client gave up on the request.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request sat in the queue too long and was dropped without dispatch.
    #[error("request timeout: waited {waited:?} in queue")]
    QueueTimeout { waited: Duration },

    /// The governor went away before answering.
    #[error("listing governor closed")]
    GovernorClosed,
}

impl ListingError {
    /// Whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ListingError::UpstreamHttp { .. }
                | ListingError::Network(_)
                | ListingError::Timeout(_)
                | ListingError::UpstreamTimeout
                | ListingError::Decode(_)
        )
    }
}

impl From<reqwest::Error> for ListingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ListingError::UpstreamTimeout
        } else if err.is_decode() {
            ListingError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ListingError::UpstreamHttp {
                status: status.as_u16(),
            }
        } else {
            ListingError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ListingError::UpstreamHttp { status: 500 }.is_retryable());
        assert!(ListingError::Network("reset".into()).is_retryable());
        assert!(ListingError::Timeout(Duration::from_secs(40)).is_retryable());
        assert!(ListingError::UpstreamTimeout.is_retryable());
        assert!(ListingError::Decode("eof".into()).is_retryable());

        assert!(!ListingError::InvalidInput("".into()).is_retryable());
        assert!(!ListingError::QueueTimeout { waited: Duration::from_secs(31) }.is_retryable());
        assert!(!ListingError::GovernorClosed.is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(ListingError::UpstreamHttp { status: 503 }.to_string(), "API error: 503");
        assert_eq!(
            ListingError::Timeout(Duration::from_secs(40)).to_string(),
            "request timed out after 40s"
        );
        assert_eq!(ListingError::UpstreamTimeout.to_string(), "upstream request timed out");
    }
}
