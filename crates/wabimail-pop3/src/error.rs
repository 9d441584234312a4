//! Error types for POP3 operations.

use std::io;
use std::time::Duration;

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The server did not answer in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Server answered `-ERR`.
    #[error("Server returned -ERR: {0}")]
    Server(String),

    /// USER/PASS or AUTH was refused.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Feature not offered by the server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// An argument cannot be sent to the server.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Returns true for failures of the transport rather than the server's
    /// answer.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::InvalidDnsName(_) | Self::Timeout(_)
        )
    }
}
