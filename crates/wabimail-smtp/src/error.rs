//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

use crate::types::RejectedRecipient;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
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

    /// Server returned an unexpected negative reply.
    #[error("SMTP error {code}: {message}")]
    Reply {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// AUTH was refused.
    #[error("Authentication failed ({code}): {message}")]
    Auth {
        /// Reply code, usually 535.
        code: u16,
        /// Server text.
        message: String,
    },

    /// Every RCPT TO was refused; nothing was sent.
    #[error("All {} recipients rejected", .0.len())]
    AllRecipientsRejected(Vec<RejectedRecipient>),

    /// The server refused DATA or the message content.
    #[error("Message rejected ({code}): {message}")]
    MessageRejected {
        /// Reply code.
        code: u16,
        /// Server text.
        message: String,
    },

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message larger than the server's advertised SIZE.
    #[error("Message exceeds size limit: {size} bytes (max {limit})")]
    MessageTooLarge {
        /// Message size.
        size: usize,
        /// Advertised limit.
        limit: usize,
    },

    /// Feature not offered by the server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a reply error from a code and message.
    #[must_use]
    pub fn reply(code: u16, message: impl Into<String>) -> Self {
        Self::Reply {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self {
            Self::Reply { code, .. } | Self::Auth { code, .. } | Self::MessageRejected { code, .. } => {
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Reply { code, .. } | Self::Auth { code, .. } | Self::MessageRejected { code, .. } => {
                *code >= 400 && *code < 500
            }
            _ => false,
        }
    }

    /// Returns true for failures of the transport rather than the server's
    /// answer.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::InvalidDnsName(_) | Self::Timeout(_)
        ) || matches!(self, Self::Reply { code: 421, .. })
    }
}
