//! Protocol adapters and the factory that picks them.
//!
//! Each adapter owns at most one connection and takes `&mut self` for
//! every operation, so a client never has two commands in flight.

mod client;
mod factory;
mod imap;
mod message;
mod pop3;
mod smtp;

pub use client::{ClientKind, ProtocolClient};
pub use factory::{CheckOutcome, ConnectionReport, MailClientFactory};
pub use imap::ImapAdapter;
pub use message::{
    FetchBatch, FetchFailure, FlagAction, Folder, FolderKind, Message, MessageFlag, MessageId,
    OutgoingMessage, Priority, RejectedRecipient, SendReport,
};
pub use pop3::Pop3Adapter;
pub use smtp::{MAILER, SmtpAdapter};
pub use wabimail_mime::Attachment;

use crate::account::{Account, AccountSettings, SecurityMode, ValidationError};
use crate::auth::Credential;
use crate::{Error, Result};

/// Host, port and security for IMAP or POP3.
pub(crate) fn incoming_config(settings: &AccountSettings) -> Result<(&str, u16, SecurityMode)> {
    let port = u16::try_from(settings.incoming_port).map_err(|_| {
        Error::InvalidSettings(vec![ValidationError::InvalidIncomingPort(
            settings.incoming_port,
        )])
    })?;
    Ok((
        settings.incoming_server.trim(),
        port,
        settings.incoming_security,
    ))
}

/// Host, port and security for SMTP.
pub(crate) fn outgoing_config(settings: &AccountSettings) -> Result<(&str, u16, SecurityMode)> {
    let port = u16::try_from(settings.outgoing_port).map_err(|_| {
        Error::InvalidSettings(vec![ValidationError::InvalidOutgoingPort(
            settings.outgoing_port,
        )])
    })?;
    Ok((
        settings.outgoing_server.trim(),
        port,
        settings.outgoing_security,
    ))
}

/// The credential an adapter was created with; its absence means the
/// user has to sign in.
pub(crate) fn require_credential<'a>(
    account: &Account,
    credential: Option<&'a Credential>,
) -> Result<&'a Credential> {
    credential.ok_or_else(|| Error::ReauthRequired(account.email.clone()))
}

impl From<SecurityMode> for wabimail_imap::Security {
    fn from(mode: SecurityMode) -> Self {
        match mode {
            SecurityMode::None => Self::None,
            SecurityMode::Ssl => Self::Implicit,
            SecurityMode::StartTls => Self::StartTls,
        }
    }
}

impl From<SecurityMode> for wabimail_smtp::Security {
    fn from(mode: SecurityMode) -> Self {
        match mode {
            SecurityMode::None => Self::None,
            SecurityMode::Ssl => Self::Implicit,
            SecurityMode::StartTls => Self::StartTls,
        }
    }
}

impl From<SecurityMode> for wabimail_pop3::Security {
    fn from(mode: SecurityMode) -> Self {
        match mode {
            SecurityMode::None => Self::None,
            SecurityMode::Ssl => Self::Implicit,
            SecurityMode::StartTls => Self::StartTls,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::AccountType;

    #[test]
    fn test_security_mapping() {
        assert_eq!(
            wabimail_imap::Security::from(SecurityMode::Ssl),
            wabimail_imap::Security::Implicit
        );
        assert_eq!(
            wabimail_pop3::Security::from(SecurityMode::StartTls),
            wabimail_pop3::Security::StartTls
        );
        assert_eq!(
            wabimail_smtp::Security::from(SecurityMode::None),
            wabimail_smtp::Security::None
        );
    }

    #[test]
    fn test_config_trims_host() {
        let mut settings = AccountSettings::gmail();
        settings.incoming_server = " imap.gmail.com ".into();
        let (host, port, security) = incoming_config(&settings).unwrap();
        assert_eq!(host, "imap.gmail.com");
        assert_eq!(port, 993);
        assert_eq!(security, SecurityMode::Ssl);
    }

    #[test]
    fn test_missing_credential_asks_for_sign_in() {
        let account = Account::new("Gmail", "user@gmail.com", AccountType::Gmail);
        assert!(matches!(
            require_credential(&account, None).unwrap_err(),
            Error::ReauthRequired(email) if email == "user@gmail.com"
        ));
    }
}
