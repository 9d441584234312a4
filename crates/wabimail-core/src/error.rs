//! Error types for the core library.

use thiserror::Error;

use crate::account::ValidationError;
use crate::service::RejectedRecipient;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Account or server settings failed validation; nothing was sent.
    #[error("Invalid settings: {}", join(.0))]
    InvalidSettings(Vec<ValidationError>),

    /// Network failure: refused connection, TLS, timeout or a dropped
    /// session.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server or the authorization server refused the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No OAuth2 callback arrived in time.
    #[error("Authorization timed out after {0} seconds")]
    AuthTimeout(u64),

    /// The OAuth2 flow was cancelled.
    #[error("Authorization cancelled")]
    AuthCancelled,

    /// The stored credential is gone or unusable; the user must sign in
    /// again.
    #[error("Account {0} must be authorized again")]
    ReauthRequired(String),

    /// Unexpected or malformed server response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Credential or file storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored record could not be decrypted (tampered, corrupt or the
    /// wrong key).
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// Nothing is stored under the given key.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another account already uses this email address.
    #[error("An account for {0} already exists")]
    DuplicateAccount(String),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The server refused every recipient; the message was not sent.
    #[error("All {} recipients were rejected", .0.len())]
    AllRecipientsRejected(Vec<RejectedRecipient>),

    /// The server refused the message content.
    #[error("Message rejected ({code}): {message}")]
    MessageRejected {
        /// SMTP reply code.
        code: u16,
        /// Server text.
        message: String,
    },

    /// The account type or server does not offer this operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if repeating the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns true if the user has to sign in again before retrying.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::ReauthRequired(_))
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<wabimail_imap::Error> for Error {
    fn from(e: wabimail_imap::Error) -> Self {
        use wabimail_imap::Error as Imap;
        if e.is_connection() {
            return Self::Connection(e.to_string());
        }
        match e {
            Imap::Auth(text) => Self::Auth(text),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<wabimail_smtp::Error> for Error {
    fn from(e: wabimail_smtp::Error) -> Self {
        use wabimail_smtp::Error as Smtp;
        if e.is_connection() {
            return Self::Connection(e.to_string());
        }
        match e {
            Smtp::Auth { code, message } => Self::Auth(format!("{code} {message}")),
            Smtp::AllRecipientsRejected(rejected) => Self::AllRecipientsRejected(
                rejected.into_iter().map(RejectedRecipient::from).collect(),
            ),
            Smtp::MessageRejected { code, message } => Self::MessageRejected { code, message },
            Smtp::NotSupported(what) => Self::Unsupported(what),
            Smtp::InvalidAddress(address) => Self::Protocol(format!("invalid address: {address}")),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<wabimail_pop3::Error> for Error {
    fn from(e: wabimail_pop3::Error) -> Self {
        use wabimail_pop3::Error as Pop3;
        if e.is_connection() {
            return Self::Connection(e.to_string());
        }
        match e {
            Pop3::Auth(text) => Self::Auth(text),
            Pop3::NotSupported(what) => Self::Unsupported(what),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<wabimail_oauth::Error> for Error {
    fn from(e: wabimail_oauth::Error) -> Self {
        use wabimail_oauth::Error as OAuth;
        match e {
            OAuth::Timeout(secs) => Self::AuthTimeout(secs),
            OAuth::Cancelled => Self::AuthCancelled,
            OAuth::AccessDenied | OAuth::StateMismatch | OAuth::OAuth { .. } => {
                Self::Auth(e.to_string())
            }
            OAuth::Io(_) | OAuth::Http(_) | OAuth::NoFreePort { .. } => {
                Self::Connection(e.to_string())
            }
            OAuth::InvalidConfig(_) | OAuth::UrlError(_) => Self::Config(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<wabimail_mime::Error> for Error {
    fn from(e: wabimail_mime::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::Connection("reset".into()).is_retryable());
        assert!(!Error::Auth("nope".into()).is_retryable());
        assert!(Error::Auth("nope".into()).requires_reauth());
        assert!(Error::ReauthRequired("a1".into()).requires_reauth());
        assert!(!Error::AuthTimeout(300).requires_reauth());
    }

    #[test]
    fn test_imap_mapping() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(Error::from(wabimail_imap::Error::Io(io)), Error::Connection(_)));
        assert!(matches!(
            Error::from(wabimail_imap::Error::Auth("bad".into())),
            Error::Auth(text) if text == "bad"
        ));
        assert!(matches!(
            Error::from(wabimail_imap::Error::No("no such mailbox".into())),
            Error::Protocol(_)
        ));
    }

    #[test]
    fn test_oauth_mapping() {
        assert!(matches!(
            Error::from(wabimail_oauth::Error::Timeout(300)),
            Error::AuthTimeout(300)
        ));
        assert!(matches!(
            Error::from(wabimail_oauth::Error::Cancelled),
            Error::AuthCancelled
        ));
        assert!(matches!(
            Error::from(wabimail_oauth::Error::AccessDenied),
            Error::Auth(_)
        ));
    }

    #[test]
    fn test_invalid_settings_display() {
        let err = Error::InvalidSettings(vec![
            ValidationError::EmptyIncomingHost,
            ValidationError::InvalidIncomingPort(70000),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid settings: Incoming server is required; Incoming port 70000 is outside 1-65535"
        );
    }
}
