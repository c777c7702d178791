//! Client error types.

use emosync_core::CoreError;
use thiserror::Error;

/// Errors surfaced by session, endpoint and polling operations.
///
/// The network family ([`ApiError::Network`], [`ApiError::Timeout`]) is kept
/// apart from protocol failures so callers can retry one and report the other.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No valid credential is held.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Login or registration was rejected; carries the server's `detail`.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server answered 401 to an authorized request.
    #[error("Session expired; please log in again")]
    SessionExpired,

    /// Connection-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its time budget.
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Non-success status other than 401.
    #[error("Server returned HTTP {status}: {body}")]
    Protocol {
        /// HTTP status code.
        status: u16,
        /// Response body (or its `detail` field).
        body: String,
    },

    /// Response body did not have the expected shape.
    #[error("Failed to parse server response: {0}")]
    Parse(String),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] CoreError),
}

impl ApiError {
    /// Whether this is a connectivity problem rather than a server answer.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(0)
        } else if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}
