//! Error types for the oracle seam.

use std::time::Duration;
use thiserror::Error;

/// Errors an oracle implementation may surface.
///
/// Orchestration never propagates these: a failing call is recorded on the
/// sample and the run continues (see `consensus` and `mining`).
#[derive(Debug, Error)]
pub enum OracleError {
    /// Rate limited - caller may retry after the specified duration.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    /// Invalid request - permanent error, don't retry.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Oracle refused the request (content policy, etc.) - permanent error.
    #[error("refused: {0}")]
    Refused(String),

    /// Provider-side error.
    #[error("provider error: {message}")]
    Provider { message: String, retryable: bool },

    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl OracleError {
    pub fn provider(message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            message: message.into(),
            retryable,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is retryable by the oracle's own retry logic.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Timeout(_) => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::InvalidRequest(_) => false,
            Self::Refused(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Refused(_) => "refused",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Config(_) => "config_error",
        }
    }
}
