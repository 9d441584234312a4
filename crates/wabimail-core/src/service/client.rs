//! The protocol client chosen by the factory.

use std::fmt;

use serde::Serialize;

use super::{ImapAdapter, Pop3Adapter, SmtpAdapter};
use crate::Result;
use crate::account::Account;

/// Which protocol a client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// IMAP receive.
    Imap,
    /// SMTP send.
    Smtp,
    /// POP3 receive.
    Pop3,
}

impl ClientKind {
    /// Lowercase protocol name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Smtp => "smtp",
            Self::Pop3 => "pop3",
        }
    }

    /// True for the protocols that read mail.
    #[must_use]
    pub const fn is_receive(self) -> bool {
        matches!(self, Self::Imap | Self::Pop3)
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol connection for one account.
///
/// The common operations are available directly; protocol specific ones
/// are reached through [`as_imap`](Self::as_imap),
/// [`as_smtp`](Self::as_smtp) and [`as_pop3`](Self::as_pop3).
#[derive(Debug)]
pub enum ProtocolClient {
    /// IMAP adapter.
    Imap(ImapAdapter),
    /// SMTP adapter.
    Smtp(SmtpAdapter),
    /// POP3 adapter.
    Pop3(Pop3Adapter),
}

impl ProtocolClient {
    /// Protocol of this client.
    #[must_use]
    pub const fn kind(&self) -> ClientKind {
        match self {
            Self::Imap(_) => ClientKind::Imap,
            Self::Smtp(_) => ClientKind::Smtp,
            Self::Pop3(_) => ClientKind::Pop3,
        }
    }

    /// The account the client serves.
    #[must_use]
    pub const fn account(&self) -> &Account {
        match self {
            Self::Imap(c) => c.account(),
            Self::Smtp(c) => c.account(),
            Self::Pop3(c) => c.account(),
        }
    }

    /// True while a session is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        match self {
            Self::Imap(c) => c.is_connected(),
            Self::Smtp(c) => c.is_connected(),
            Self::Pop3(c) => c.is_connected(),
        }
    }

    /// Opens and authenticates the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`](crate::Error::InvalidSettings)
    /// before any socket is opened when the settings are unusable, or the
    /// connection or authentication failure.
    pub async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Imap(c) => c.connect().await,
            Self::Smtp(c) => c.connect().await,
            Self::Pop3(c) => c.connect().await,
        }
    }

    /// Checks that the open session still answers.
    ///
    /// # Errors
    ///
    /// Returns an error when not connected or the server is gone.
    pub async fn test_connection(&mut self) -> Result<()> {
        match self {
            Self::Imap(c) => c.test_connection().await,
            Self::Smtp(c) => c.test_connection().await,
            Self::Pop3(c) => c.test_connection().await,
        }
    }

    /// Ends the session politely.
    pub async fn disconnect(&mut self) {
        match self {
            Self::Imap(c) => c.disconnect().await,
            Self::Smtp(c) => c.disconnect().await,
            Self::Pop3(c) => c.disconnect().await,
        }
    }

    /// The IMAP adapter, if this is one.
    pub const fn as_imap(&mut self) -> Option<&mut ImapAdapter> {
        match self {
            Self::Imap(c) => Some(c),
            _ => None,
        }
    }

    /// The SMTP adapter, if this is one.
    pub const fn as_smtp(&mut self) -> Option<&mut SmtpAdapter> {
        match self {
            Self::Smtp(c) => Some(c),
            _ => None,
        }
    }

    /// The POP3 adapter, if this is one.
    pub const fn as_pop3(&mut self) -> Option<&mut Pop3Adapter> {
        match self {
            Self::Pop3(c) => Some(c),
            _ => None,
        }
    }
}
