//! Store-specific error types.
//!
//! All store operations return [`StoreError`] on failure. The engine uses
//! [`StoreError::is_connection`] to decide whether a failure is isolated to a
//! single query or means the whole source is unusable this cycle.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur talking to a time-series store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Transport-level failure (DNS, refused connection, TLS, reset).
    #[error("connection error: {0}")]
    Connection(String),

    /// The call did not complete within the allowed time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered but cannot serve requests (5xx, auth failure).
    #[error("store unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The store refused this particular request (bad query, bad bucket).
    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A point could not be encoded for the store.
    #[error("failed to encode point: {0}")]
    Encode(String),

    /// Store endpoint is not a valid URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl StoreError {
    /// Classify a non-success HTTP status.
    ///
    /// Server errors and authentication failures affect every request to the
    /// store; anything else is specific to the request that was sent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 | 500..=599 => Self::Unavailable { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// Whether this error means the store itself is unreachable or unusable.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Unavailable { .. }
        )
    }
}
