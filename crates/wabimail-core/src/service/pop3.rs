//! POP3 receive adapter.
//!
//! Fetching never deletes: messages stay on the server and are identified
//! by their UIDL, so the caller can tell which ones it has already seen.
//! Deletions are committed when [`disconnect`](Pop3Adapter::disconnect)
//! sends QUIT and can be undone before that with
//! [`reset_deletions`](Pop3Adapter::reset_deletions).

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use wabimail_pop3::{Authorization, Client, Config, Pop3Stream, Transaction, UidlEntry};

use super::message::{FetchBatch, MessageId};
use super::{incoming_config, require_credential};
use crate::account::{Account, AuthType, validate_incoming};
use crate::auth::Credential;
use crate::config::NetworkTimeouts;
use crate::{Error, Result};

/// POP3 adapter for POP3 accounts. There is no folder concept.
pub struct Pop3Adapter<S = Pop3Stream> {
    account: Account,
    credential: Option<Credential>,
    timeouts: NetworkTimeouts,
    session: Option<Client<S, Transaction>>,
}

impl<S> std::fmt::Debug for Pop3Adapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pop3Adapter")
            .field("account", &self.account.email)
            .field("connected", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Pop3Adapter<Pop3Stream> {
    /// Validates the incoming settings, connects (STLS when configured)
    /// and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] before any socket is opened if the
    /// host or port is unusable, [`Error::Connection`] on network failure
    /// and [`Error::Auth`] if the server refuses the login.
    pub async fn connect(&mut self) -> Result<()> {
        validate_incoming(&self.account.settings).map_err(Error::InvalidSettings)?;
        self.require_login()?;
        require_credential(&self.account, self.credential.as_ref())?;
        let (host, port, security) = incoming_config(&self.account.settings)?;

        debug!(account = %self.account.email, host, port, "connecting to POP3");
        let config = Config::new(host)
            .with_port(port)
            .with_security(security.into())
            .with_timeouts(self.timeouts.connect, self.timeouts.io);
        let client = Client::connect(&config).await?;
        self.start(client).await
    }
}

impl<S> Pop3Adapter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a disconnected adapter.
    #[must_use]
    pub fn new(account: Account, credential: Option<Credential>) -> Self {
        Self {
            account,
            credential,
            timeouts: NetworkTimeouts::default(),
            session: None,
        }
    }

    /// Overrides the network timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: NetworkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The account this adapter serves.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// True while a session is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Logs in on a client that has read the greeting: USER/PASS for
    /// passwords, AUTH XOAUTH2 for OAuth2 tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReauthRequired`] without a credential and
    /// [`Error::Auth`] if the server refuses it.
    pub async fn start(&mut self, client: Client<S, Authorization>) -> Result<()> {
        self.require_login()?;
        let credential = require_credential(&self.account, self.credential.as_ref())?;
        let username = self.account.username();

        let client = if credential.is_oauth() {
            client.auth_xoauth2(username, credential.secret()).await?
        } else {
            client.login(username, credential.secret()).await?
        };
        self.session = Some(client.with_io_timeout(Some(self.timeouts.io)));
        info!(account = %self.account.email, "POP3 session open");
        Ok(())
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when not connected or the server is
    /// gone.
    pub async fn test_connection(&mut self) -> Result<()> {
        let result = self.session()?.noop().await;
        self.check(result)
    }

    /// Sends QUIT, which commits pending deletions, and drops the session.
    /// Errors are only logged.
    pub async fn disconnect(&mut self) {
        let Some(client) = self.session.take() else {
            return;
        };
        if let Err(e) = client.quit().await {
            warn!(account = %self.account.email, error = %e, "QUIT failed, deletions may not be committed");
        }
        info!(account = %self.account.email, "POP3 session closed");
    }

    /// Number of messages in the maildrop.
    ///
    /// # Errors
    ///
    /// Returns an error if STAT fails.
    pub async fn message_count(&mut self) -> Result<u32> {
        let result = self.session()?.stat().await;
        Ok(self.check(result)?.count)
    }

    /// Total size of the maildrop in octets.
    ///
    /// # Errors
    ///
    /// Returns an error if STAT fails.
    pub async fn mailbox_size(&mut self) -> Result<u64> {
        let result = self.session()?.stat().await;
        Ok(self.check(result)?.size)
    }

    /// Newest `limit` messages, newest first, without deleting them.
    ///
    /// A message that cannot be retrieved or parsed becomes a per-item
    /// failure in the batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the server has no UIDL, or an
    /// error if listing fails.
    pub async fn fetch_messages(&mut self, limit: usize) -> Result<FetchBatch> {
        self.fetch(limit, None).await
    }

    /// Like [`fetch_messages`](Self::fetch_messages) but retrieves headers
    /// only, with `TOP n 0`.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_messages`](Self::fetch_messages); a server without
    /// TOP reports each message as a failure.
    pub async fn fetch_headers(&mut self, limit: usize) -> Result<FetchBatch> {
        self.fetch(limit, Some(0)).await
    }

    async fn fetch(&mut self, limit: usize, top_lines: Option<u32>) -> Result<FetchBatch> {
        if limit == 0 {
            return Ok(FetchBatch::default());
        }
        let mut entries = self.uidl().await?;
        entries.sort_by_key(|e| std::cmp::Reverse(e.number));
        entries.truncate(limit);

        let mut batch = FetchBatch::default();
        for entry in entries {
            let id = MessageId::pop3(&entry.uid);
            let result = match top_lines {
                Some(lines) => self.session()?.top(entry.number, lines).await,
                None => self.session()?.retr(entry.number).await,
            };
            match result {
                Ok(raw) => batch.push_raw(id, &raw, Vec::new(), None),
                Err(e) if e.is_connection() => return Err(self.fail(e)),
                Err(e) => batch.push_failure(id, e.into()),
            }
        }
        debug!(
            messages = batch.messages.len(),
            failures = batch.failures.len(),
            "fetch complete"
        );
        Ok(batch)
    }

    /// Marks the message deleted. It is removed when the session ends
    /// with QUIT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no message has that UIDL and
    /// [`Error::Unsupported`] for an IMAP id.
    pub async fn delete_message(&mut self, id: &MessageId) -> Result<()> {
        let MessageId::Pop3 { uid } = id else {
            return Err(Error::Unsupported(format!(
                "message {id} is not a POP3 message"
            )));
        };
        let number = self
            .uidl()
            .await?
            .into_iter()
            .find(|e| &e.uid == uid)
            .map(|e| e.number)
            .ok_or_else(|| Error::NotFound(format!("message {uid}")))?;

        let result = self.session()?.dele(number).await;
        self.check(result)?;
        info!(message = %id, "message marked deleted");
        Ok(())
    }

    /// Unmarks every deletion made in this session.
    ///
    /// # Errors
    ///
    /// Returns an error if RSET fails.
    pub async fn reset_deletions(&mut self) -> Result<()> {
        let result = self.session()?.rset().await;
        self.check(result)?;
        debug!(account = %self.account.email, "deletions reset");
        Ok(())
    }

    async fn uidl(&mut self) -> Result<Vec<UidlEntry>> {
        let result = self.session()?.uidl().await;
        self.check(result)
    }

    fn session(&mut self) -> Result<&mut Client<S, Transaction>> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Connection("not connected".into()))
    }

    fn check<T>(&mut self, result: wabimail_pop3::Result<T>) -> Result<T> {
        result.map_err(|e| self.fail(e))
    }

    /// Drops the session on transport failure.
    fn fail(&mut self, e: wabimail_pop3::Error) -> Error {
        if e.is_connection() {
            warn!(account = %self.account.email, error = %e, "POP3 connection lost");
            self.session = None;
        }
        e.into()
    }

    fn require_login(&self) -> Result<()> {
        if self.account.auth_type == AuthType::None {
            return Err(Error::Unsupported(format!(
                "POP3 account {} has no authentication method",
                self.account.email
            )));
        }
        Ok(())
    }
}
