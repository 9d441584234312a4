//! Picks the protocol client for an account.

use std::sync::Arc;

use tracing::{debug, info};

use super::{ClientKind, ImapAdapter, Pop3Adapter, ProtocolClient, SmtpAdapter};
use crate::account::{Account, AccountType, AuthType, validate_incoming, validate_outgoing};
use crate::auth::{Credential, CredentialProvider};
use crate::config::NetworkTimeouts;
use crate::{Error, Result};

/// Account types that have a receive client.
const RECEIVE_TYPES: [AccountType; 3] = [AccountType::Gmail, AccountType::Imap, AccountType::Pop3];

/// Result of one direction of a connection test.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Connected, authenticated and answered NOOP.
    Passed,
    /// Failed with this error.
    Failed(Error),
    /// The account has no client for this direction.
    NotApplicable,
}

impl CheckOutcome {
    /// False only for [`CheckOutcome::Failed`].
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Both directions of [`MailClientFactory::test_account_connection`],
/// each reported on its own.
#[derive(Debug)]
pub struct ConnectionReport {
    /// IMAP or POP3.
    pub receive: CheckOutcome,
    /// SMTP.
    pub send: CheckOutcome,
}

impl ConnectionReport {
    /// True when neither direction failed.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.receive.is_ok() && self.send.is_ok()
    }
}

/// Creates unconnected protocol clients. Holds no client cache.
#[derive(Clone)]
pub struct MailClientFactory {
    credentials: Arc<dyn CredentialProvider>,
    timeouts: NetworkTimeouts,
}

impl std::fmt::Debug for MailClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailClientFactory")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl MailClientFactory {
    /// Creates a factory that asks `credentials` for secrets.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            credentials,
            timeouts: NetworkTimeouts::default(),
        }
    }

    /// Timeouts given to every client.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: NetworkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Account types with a receive client.
    #[must_use]
    pub const fn supported_receive_kinds() -> &'static [AccountType] {
        &RECEIVE_TYPES
    }

    /// Receive protocol for an account type, if it has one.
    #[must_use]
    pub const fn receive_kind(account_type: AccountType) -> Option<ClientKind> {
        match account_type {
            AccountType::Gmail | AccountType::Imap => Some(ClientKind::Imap),
            AccountType::Pop3 => Some(ClientKind::Pop3),
            AccountType::Smtp | AccountType::Exchange => None,
        }
    }

    /// Every protocol the account can use.
    #[must_use]
    pub fn supported_clients(account: &Account) -> Vec<ClientKind> {
        Self::receive_kind(account.account_type)
            .into_iter()
            .chain(std::iter::once(ClientKind::Smtp))
            .collect()
    }

    /// IMAP for Gmail and IMAP accounts, POP3 for POP3 accounts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for SMTP-only and Exchange accounts,
    /// or the credential provider's error (e.g.
    /// [`Error::ReauthRequired`]).
    pub async fn create_receive_client(&self, account: &Account) -> Result<ProtocolClient> {
        let kind = Self::receive_kind(account.account_type).ok_or_else(|| {
            Error::Unsupported(format!(
                "{} accounts have no receive client",
                account.account_type
            ))
        })?;
        self.create_client(account, kind).await
    }

    /// SMTP client; available for every account type.
    ///
    /// # Errors
    ///
    /// Returns the credential provider's error.
    pub async fn create_send_client(&self, account: &Account) -> Result<ProtocolClient> {
        self.create_client(account, ClientKind::Smtp).await
    }

    /// Client of the given protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the account cannot use `kind`,
    /// [`Error::InvalidSettings`] if the settings for that direction are
    /// unusable (checked before any credential lookup), or the credential
    /// provider's error.
    pub async fn create_client(&self, account: &Account, kind: ClientKind) -> Result<ProtocolClient> {
        if kind.is_receive() && Self::receive_kind(account.account_type) != Some(kind) {
            return Err(Error::Unsupported(format!(
                "{} accounts cannot use {kind}",
                account.account_type
            )));
        }

        // Settings are checked before any secret is loaded or refreshed.
        match kind {
            ClientKind::Imap | ClientKind::Pop3 => validate_incoming(&account.settings),
            ClientKind::Smtp => validate_outgoing(&account.settings),
        }
        .map_err(Error::InvalidSettings)?;

        let needs_secret = match kind {
            ClientKind::Imap | ClientKind::Pop3 => account.auth_type != AuthType::None,
            ClientKind::Smtp => {
                account.settings.requires_auth && account.auth_type != AuthType::None
            }
        };
        let credential = if needs_secret {
            Some(self.credential(account).await?)
        } else {
            None
        };

        debug!(account = %account.email, %kind, "client created");
        let account = account.clone();
        Ok(match kind {
            ClientKind::Imap => {
                ProtocolClient::Imap(ImapAdapter::new(account, credential).with_timeouts(self.timeouts))
            }
            ClientKind::Smtp => {
                ProtocolClient::Smtp(SmtpAdapter::new(account, credential).with_timeouts(self.timeouts))
            }
            ClientKind::Pop3 => {
                ProtocolClient::Pop3(Pop3Adapter::new(account, credential).with_timeouts(self.timeouts))
            }
        })
    }

    /// Connects, checks and disconnects each direction. A failure in one
    /// direction does not stop the other.
    pub async fn test_account_connection(&self, account: &Account) -> ConnectionReport {
        let receive = if Self::receive_kind(account.account_type).is_some() {
            Self::check(self.create_receive_client(account).await).await
        } else {
            CheckOutcome::NotApplicable
        };
        let send = Self::check(self.create_send_client(account).await).await;

        info!(
            account = %account.email,
            receive = receive.is_ok(),
            send = send.is_ok(),
            "connection test finished"
        );
        ConnectionReport { receive, send }
    }

    async fn check(client: Result<ProtocolClient>) -> CheckOutcome {
        let mut client = match client {
            Ok(client) => client,
            Err(e) => return CheckOutcome::Failed(e),
        };
        let outcome = match client.connect().await {
            Ok(()) => client.test_connection().await,
            Err(e) => Err(e),
        };
        client.disconnect().await;
        match outcome {
            Ok(()) => CheckOutcome::Passed,
            Err(e) => CheckOutcome::Failed(e),
        }
    }

    async fn credential(&self, account: &Account) -> Result<Credential> {
        self.credentials.credential(account).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::account::ValidationError;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        missing: bool,
    }

    #[async_trait]
    impl CredentialProvider for Counting {
        async fn credential(&self, account: &Account) -> Result<Credential> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.missing {
                return Err(Error::ReauthRequired(account.email.clone()));
            }
            Ok(Credential::Password("pw".into()))
        }
    }

    fn factory() -> (MailClientFactory, Arc<Counting>) {
        let provider = Arc::new(Counting::default());
        (MailClientFactory::new(provider.clone()), provider)
    }

    fn account(account_type: AccountType) -> Account {
        let mut account = Account::new("Test", "me@example.com", account_type);
        account.settings.incoming_server = "mail.example.com".into();
        account.settings.outgoing_server = "smtp.example.com".into();
        account
    }

    #[tokio::test]
    async fn test_receive_client_by_type() {
        let (factory, _) = factory();
        let gmail = factory
            .create_receive_client(&account(AccountType::Gmail))
            .await
            .unwrap();
        assert_eq!(gmail.kind(), ClientKind::Imap);
        assert!(!gmail.is_connected());

        let mut pop = factory
            .create_receive_client(&account(AccountType::Pop3))
            .await
            .unwrap();
        assert_eq!(pop.kind(), ClientKind::Pop3);
        assert!(pop.as_pop3().is_some());
        assert!(pop.as_imap().is_none());

        for account_type in [AccountType::Smtp, AccountType::Exchange] {
            let err = factory
                .create_receive_client(&account(account_type))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Unsupported(_)));
        }
    }

    #[tokio::test]
    async fn test_send_client_for_every_type() {
        let (factory, _) = factory();
        for account_type in AccountType::ALL {
            let client = factory
                .create_send_client(&account(account_type))
                .await
                .unwrap();
            assert_eq!(client.kind(), ClientKind::Smtp);
        }
    }

    #[tokio::test]
    async fn test_no_secret_fetched_without_auth() {
        let (factory, provider) = factory();
        let mut relay = account(AccountType::Smtp);
        relay.settings.requires_auth = false;

        factory.create_send_client(&relay).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        factory
            .create_receive_client(&account(AccountType::Imap))
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_settings_rejected_before_credential_lookup() {
        let provider = Arc::new(Counting {
            missing: true,
            ..Counting::default()
        });
        let factory = MailClientFactory::new(provider.clone());
        let mut gmail = account(AccountType::Gmail);
        gmail.settings.incoming_port = 70000;
        gmail.settings.outgoing_server = "  ".into();

        let err = factory.create_receive_client(&gmail).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSettings(ref errors)
                if errors == &[ValidationError::InvalidIncomingPort(70000)]
        ));
        let err = factory.create_send_client(&gmail).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_propagates() {
        let provider = Arc::new(Counting {
            missing: true,
            ..Counting::default()
        });
        let factory = MailClientFactory::new(provider);
        let err = factory
            .create_receive_client(&account(AccountType::Gmail))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReauthRequired(_)));
    }

    #[tokio::test]
    async fn test_connection_report_is_per_direction() {
        let (factory, _) = factory();
        let mut broken = account(AccountType::Imap);
        broken.settings.incoming_port = 70000;
        broken.settings.outgoing_port = 0;

        let report = factory.test_account_connection(&broken).await;
        assert!(matches!(report.receive, CheckOutcome::Failed(Error::InvalidSettings(_))));
        assert!(matches!(report.send, CheckOutcome::Failed(Error::InvalidSettings(_))));
        assert!(!report.is_ok());

        let mut exchange = account(AccountType::Exchange);
        exchange.settings.outgoing_port = 0;
        let report = factory.test_account_connection(&exchange).await;
        assert!(matches!(report.receive, CheckOutcome::NotApplicable));
    }

    #[test]
    fn test_supported_kinds() {
        assert_eq!(
            MailClientFactory::supported_receive_kinds(),
            &[AccountType::Gmail, AccountType::Imap, AccountType::Pop3]
        );
        assert_eq!(
            MailClientFactory::supported_clients(&account(AccountType::Pop3)),
            vec![ClientKind::Pop3, ClientKind::Smtp]
        );
        assert_eq!(
            MailClientFactory::supported_clients(&account(AccountType::Exchange)),
            vec![ClientKind::Smtp]
        );
    }
}
