//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Missing boundary in multipart message.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// Invalid mailbox address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Missing required header.
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// The input does not look like a message.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A header value contains a bare line break.
    #[error("Header {0} contains a line break")]
    HeaderInjection(String),
}
