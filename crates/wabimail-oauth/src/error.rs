//! Error types for `OAuth2` operations.

use std::io;

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (callback listener socket).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP transport error talking to the token endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OAuth2` error returned by the authorization server.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// No refresh token available.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Invalid token response.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// No callback arrived before the deadline.
    #[error("Authorization timed out after {0} seconds")]
    Timeout(u64),

    /// The flow was cancelled by the caller.
    #[error("Authorization cancelled")]
    Cancelled,

    /// User denied authorization.
    #[error("User denied authorization")]
    AccessDenied,

    /// The `state` echoed by the redirect did not match the one we sent.
    #[error("Authorization state mismatch")]
    StateMismatch,

    /// No port in the configured range could be bound.
    #[error("No free callback port in {start}..={end}")]
    NoFreePort {
        /// First port tried.
        start: u16,
        /// Last port tried.
        end: u16,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Returns true if the authorization server definitively refused the
    /// grant, so retrying with the same refresh token cannot succeed.
    #[must_use]
    pub const fn is_grant_rejected(&self) -> bool {
        matches!(self, Self::OAuth { .. } | Self::NoRefreshToken)
    }

    /// Returns true for transport-level failures that may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Http(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_rejection_classification() {
        assert!(Error::oauth_error("invalid_grant", "Token has been revoked").is_grant_rejected());
        assert!(Error::NoRefreshToken.is_grant_rejected());
        assert!(!Error::Timeout(300).is_grant_rejected());
        assert!(!Error::InvalidResponse("empty".into()).is_grant_rejected());
    }

    #[test]
    fn test_transient_classification() {
        let io = Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(io.is_transient());
        assert!(!Error::AccessDenied.is_transient());
    }

    #[test]
    fn test_display() {
        let err = Error::oauth_error("invalid_grant", "expired");
        assert_eq!(err.to_string(), "OAuth2 error: invalid_grant - expired");
        let err = Error::NoFreePort {
            start: 8080,
            end: 8090,
        };
        assert_eq!(err.to_string(), "No free callback port in 8080..=8090");
    }
}
