//! Error types for seismomap.
//!
//! Uses `thiserror` for library-style error definitions.

use thiserror::Error;

/// Errors that can occur in seismomap operations.
#[derive(Error, Debug)]
pub enum SeismomapError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Feed returned an error status
    #[error("feed error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid response structure
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A single feature could not be turned into an earthquake
    #[error("Malformed feature: {0}")]
    MalformedFeature(String),

    /// Configuration rejected before any fetch
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SeismomapError {
    /// Whether a retry of the same request could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self, retryable_statuses: &[u16]) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => retryable_statuses.contains(status),
            _ => false,
        }
    }
}
