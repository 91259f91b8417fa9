//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when talking to the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Non-success API response that is not otherwise classified.
    #[error("GitHub API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Authentication required or failed.
    #[error("Authentication required")]
    AuthRequired,

    /// Resource not found (repo, workflow, run).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Response body could not be decoded.
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// The retry budget was exhausted without a usable response.
    #[error("Request failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl GitHubError {
    /// Create an API error.
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Check if this error is a rate limit error (retryable).
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Classification of a failed credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorKind {
    /// The token itself is the problem (invalid, expired, insufficient).
    Authentication,
    /// The API could not be reached; the token may still be fine.
    Api,
    /// Unexpected failure while validating.
    Internal,
}

/// Error returned by credential validation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TokenError {
    pub kind: TokenErrorKind,
    pub message: String,
}

impl TokenError {
    #[inline]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self {
            kind: TokenErrorKind::Authentication,
            message: message.into(),
        }
    }

    #[inline]
    pub fn api(message: impl Into<String>) -> Self {
        Self {
            kind: TokenErrorKind::Api,
            message: message.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: TokenErrorKind::Internal,
            message: message.into(),
        }
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which is useful for errors
/// that include multi-line details. This provides a concise message for
/// progress reporting and logging.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}
