//! Error types for the sync client.

use thiserror::Error;

/// Errors surfaced by the client crate.
///
/// Transport failures on the sync socket are not errors: the client logs
/// them and reconnects. These cover configuration and one-shot lookups.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured server URL cannot be used.
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a status the caller does not handle.
    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    /// Party code is empty or too long.
    #[error("Invalid party code: {0}")]
    InvalidPartyCode(String),

    /// Client configuration rejected by validation.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convenient Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
