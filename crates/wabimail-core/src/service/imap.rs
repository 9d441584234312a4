//! IMAP receive adapter.
//!
//! Holds one authenticated connection. The first operation on a folder
//! selects it; later operations on the same folder reuse the selection.
//! After a transport failure the session is dropped and [`connect`]
//! must be called again.
//!
//! [`connect`]: ImapAdapter::connect

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use wabimail_imap::{
    Authenticated, Client, Config, Flag, ImapStream, NotAuthenticated, SearchCriteria, Selected,
    StoreAction,
};

use super::message::{FetchBatch, FlagAction, Folder, MessageFlag, MessageId};
use super::{incoming_config, require_credential};
use crate::account::{Account, AuthType, validate_incoming};
use crate::auth::Credential;
use crate::config::NetworkTimeouts;
use crate::{Error, Result};

enum ImapSession<S> {
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>),
}

/// IMAP adapter for Gmail and generic IMAP accounts.
pub struct ImapAdapter<S = ImapStream> {
    account: Account,
    credential: Option<Credential>,
    timeouts: NetworkTimeouts,
    session: Option<ImapSession<S>>,
}

impl<S> std::fmt::Debug for ImapAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapAdapter")
            .field("account", &self.account.email)
            .field("connected", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl ImapAdapter<ImapStream> {
    /// Validates the incoming settings, connects and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] before any socket is opened if the
    /// host or port is unusable, [`Error::ReauthRequired`] without a
    /// credential, [`Error::Connection`] on network failure and
    /// [`Error::Auth`] if the server refuses the login.
    pub async fn connect(&mut self) -> Result<()> {
        validate_incoming(&self.account.settings).map_err(Error::InvalidSettings)?;
        self.require_login()?;
        let (host, port, security) = incoming_config(&self.account.settings)?;

        debug!(account = %self.account.email, host, port, "connecting to IMAP");
        let config = Config::new(host)
            .with_port(port)
            .with_security(security.into())
            .with_timeouts(self.timeouts.connect, self.timeouts.io);
        let client = Client::connect(&config).await?;
        self.start(client).await
    }
}

impl<S> ImapAdapter<S>
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

    /// Logs in on a client that has read the greeting.
    ///
    /// Uses LOGIN for password accounts and `AUTHENTICATE XOAUTH2` for
    /// OAuth2 accounts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReauthRequired`] without a credential and
    /// [`Error::Auth`] if the server refuses it.
    pub async fn start(&mut self, client: Client<S, NotAuthenticated>) -> Result<()> {
        self.require_login()?;
        let credential = require_credential(&self.account, self.credential.as_ref())?;
        let username = self.account.username();

        let client = if credential.is_oauth() {
            client
                .authenticate_xoauth2(username, credential.secret())
                .await?
        } else {
            client.login(username, credential.secret()).await?
        };

        self.session = Some(ImapSession::Authenticated(
            client.with_io_timeout(Some(self.timeouts.io)),
        ));
        info!(account = %self.account.email, "IMAP session open");
        Ok(())
    }

    /// Sends NOOP on the open session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when not connected or the server is
    /// gone.
    pub async fn test_connection(&mut self) -> Result<()> {
        let result = match self.session.as_mut() {
            Some(ImapSession::Authenticated(c)) => c.noop().await,
            Some(ImapSession::Selected(c)) => c.noop().await,
            None => return Err(not_connected()),
        };
        self.check(result)
    }

    /// Logs out and drops the session. Errors during LOGOUT are only
    /// logged.
    pub async fn disconnect(&mut self) {
        let result = match self.session.take() {
            Some(ImapSession::Authenticated(c)) => c.logout().await,
            Some(ImapSession::Selected(c)) => c.logout().await,
            None => return,
        };
        if let Err(e) = result {
            debug!(account = %self.account.email, error = %e, "LOGOUT failed");
        }
        info!(account = %self.account.email, "IMAP session closed");
    }

    /// Every folder on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if LIST fails.
    pub async fn list_folders(&mut self) -> Result<Vec<Folder>> {
        let result = match self.session.as_mut() {
            Some(ImapSession::Authenticated(c)) => c.list("", "*").await,
            Some(ImapSession::Selected(c)) => c.list("", "*").await,
            None => return Err(not_connected()),
        };
        let folders = self.check(result)?;
        debug!(count = folders.len(), "folders listed");
        Ok(folders.into_iter().map(Folder::from).collect())
    }

    /// Newest `limit` messages of `folder`, newest first.
    ///
    /// A message that is missing or fails to parse becomes a
    /// [`FetchFailure`](super::FetchFailure) in the batch; the rest are
    /// still returned. Bodies are read with `BODY.PEEK[]` so `\Seen` is
    /// not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be selected or the search
    /// or fetch command fails as a whole.
    pub async fn fetch_messages(
        &mut self,
        folder: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<FetchBatch> {
        if limit == 0 {
            return Ok(FetchBatch::default());
        }
        let criteria = if unread_only {
            SearchCriteria::Unseen
        } else {
            SearchCriteria::All
        };

        let result = self.selected(folder).await?.uid_search(criteria).await;
        let mut uids = self.check(result)?;
        let mut wanted = uids.split_off(uids.len().saturating_sub(limit));
        wanted.reverse();
        if wanted.is_empty() {
            return Ok(FetchBatch::default());
        }

        let result = self.selected(folder).await?.uid_fetch(&wanted).await;
        let mut fetched: HashMap<u32, _> = self
            .check(result)?
            .into_iter()
            .filter_map(|m| m.uid.map(|uid| (uid, m)))
            .collect();

        let mut batch = FetchBatch::default();
        for uid in wanted {
            let id = MessageId::imap(folder, uid);
            match fetched.remove(&uid) {
                Some(message) => match message.body {
                    Some(body) => {
                        let flags = message.flags.into_iter().map(MessageFlag::from).collect();
                        let size = message.size.and_then(|s| usize::try_from(s).ok());
                        batch.push_raw(id, &body, flags, size);
                    }
                    None => {
                        batch.push_failure(id, Error::Protocol("server sent no body".into()));
                    }
                },
                None => batch.push_failure(id, Error::NotFound(format!("UID {uid} in {folder}"))),
            }
        }
        debug!(
            folder,
            messages = batch.messages.len(),
            failures = batch.failures.len(),
            "fetch complete"
        );
        Ok(batch)
    }

    /// Changes the flags of one message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for a POP3 id, or the server's
    /// refusal.
    pub async fn set_flags(
        &mut self,
        id: &MessageId,
        action: FlagAction,
        flags: &[MessageFlag],
    ) -> Result<()> {
        let (folder, uid) = imap_location(id)?;
        let flags: Vec<Flag> = flags.iter().map(Flag::from).collect();
        let action = match action {
            FlagAction::Add => StoreAction::Add,
            FlagAction::Remove => StoreAction::Remove,
            FlagAction::Replace => StoreAction::Replace,
        };
        let result = self
            .selected(folder)
            .await?
            .uid_store(&[uid], action, &flags)
            .await;
        self.check(result)?;
        debug!(message = %id, ?action, "flags stored");
        Ok(())
    }

    /// Adds `\Seen`.
    ///
    /// # Errors
    ///
    /// See [`set_flags`](Self::set_flags).
    pub async fn mark_as_read(&mut self, id: &MessageId) -> Result<()> {
        self.set_flags(id, FlagAction::Add, &[MessageFlag::Seen]).await
    }

    /// Removes `\Seen`.
    ///
    /// # Errors
    ///
    /// See [`set_flags`](Self::set_flags).
    pub async fn mark_as_unread(&mut self, id: &MessageId) -> Result<()> {
        self.set_flags(id, FlagAction::Remove, &[MessageFlag::Seen])
            .await
    }

    /// Flags the message `\Deleted` and expunges it: only this message
    /// with UIDPLUS, the whole folder's `\Deleted` set otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if either step is refused.
    pub async fn delete_message(&mut self, id: &MessageId) -> Result<()> {
        self.set_flags(id, FlagAction::Add, &[MessageFlag::Deleted])
            .await?;
        let (folder, uid) = imap_location(id)?;
        let result = self.selected(folder).await?.uid_expunge(&[uid]).await;
        self.check(result)?;
        info!(message = %id, "message deleted");
        Ok(())
    }

    /// Moves a message to `destination`, with MOVE when the server has it
    /// and COPY plus delete otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination does not exist or a step is
    /// refused.
    pub async fn move_message(&mut self, id: &MessageId, destination: &str) -> Result<()> {
        let (folder, uid) = imap_location(id)?;
        let result = self
            .selected(folder)
            .await?
            .uid_move(&[uid], destination)
            .await;
        self.check(result)?;
        info!(message = %id, destination, "message moved");
        Ok(())
    }

    /// Number of messages in `folder` without `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if STATUS fails.
    pub async fn unread_count(&mut self, folder: &str) -> Result<u32> {
        Ok(self.status(folder).await?.unseen.unwrap_or(0))
    }

    /// Number of messages in `folder`.
    ///
    /// # Errors
    ///
    /// Returns an error if STATUS fails.
    pub async fn message_count(&mut self, folder: &str) -> Result<u32> {
        Ok(self.status(folder).await?.messages.unwrap_or(0))
    }

    async fn status(&mut self, folder: &str) -> Result<wabimail_imap::StatusInfo> {
        let result = match self.session.as_mut() {
            Some(ImapSession::Authenticated(c)) => c.status(folder).await,
            Some(ImapSession::Selected(c)) => c.status(folder).await,
            None => return Err(not_connected()),
        };
        self.check(result)
    }

    /// The session with `folder` selected, selecting it when needed.
    /// A failed SELECT consumes the connection.
    async fn selected(&mut self, folder: &str) -> Result<&mut Client<S, Selected>> {
        let opened = match self.session.take() {
            Some(ImapSession::Selected(c)) if c.mailbox() == folder => Ok(c),
            Some(ImapSession::Selected(c)) => c.select(folder).await,
            Some(ImapSession::Authenticated(c)) => c.select(folder).await,
            None => return Err(not_connected()),
        };
        match opened {
            Ok(client) => self.session = Some(ImapSession::Selected(client)),
            Err(e) => {
                warn!(account = %self.account.email, folder, error = %e, "SELECT failed, session closed");
                return Err(e.into());
            }
        }
        match self.session.as_mut() {
            Some(ImapSession::Selected(client)) => Ok(client),
            _ => Err(not_connected()),
        }
    }

    /// Converts a protocol result, dropping the session on transport
    /// failure.
    fn check<T>(&mut self, result: wabimail_imap::Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.is_connection() {
                warn!(account = %self.account.email, error = %e, "IMAP connection lost");
                self.session = None;
            }
            e.into()
        })
    }

    fn require_login(&self) -> Result<()> {
        if self.account.auth_type == AuthType::None {
            return Err(Error::Unsupported(format!(
                "IMAP account {} has no authentication method",
                self.account.email
            )));
        }
        Ok(())
    }
}

fn imap_location(id: &MessageId) -> Result<(&str, u32)> {
    match id {
        MessageId::Imap { folder, uid } => Ok((folder, *uid)),
        MessageId::Pop3 { .. } => Err(Error::Unsupported(format!(
            "message {id} is not an IMAP message"
        ))),
    }
}

fn not_connected() -> Error {
    Error::Connection("not connected".into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::service::FolderKind;
    use tokio_test::io::{Builder, Mock};

    const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 AUTH=XOAUTH2] ready\r\n";
    const SELECT_INBOX: &[u8] = b"* 3 EXISTS\r\n* 0 RECENT\r\n\
* OK [UIDVALIDITY 1700000000] UIDs valid\r\n\
A0002 OK [READ-WRITE] SELECT completed\r\n";

    fn account() -> Account {
        let mut account = Account::new("Work", "user@example.com", AccountType::Imap);
        account.settings.incoming_server = "imap.example.com".into();
        account.settings.outgoing_server = "smtp.example.com".into();
        account
    }

    async fn adapter(mock: Mock) -> ImapAdapter<Mock> {
        let mut adapter =
            ImapAdapter::new(account(), Some(Credential::Password("secret".into())));
        let client = Client::from_stream(mock).await.unwrap();
        adapter.start(client).await.unwrap();
        adapter
    }

    fn login(builder: &mut Builder) -> &mut Builder {
        builder
            .read(GREETING)
            .write(b"A0001 LOGIN user@example.com secret\r\n")
            .read(b"A0001 OK Logged in\r\n")
    }

    #[tokio::test]
    async fn test_fetch_newest_first_with_bad_item() {
        let mut builder = Builder::new();
        let mock = login(&mut builder)
            .write(b"A0002 SELECT INBOX\r\n")
            .read(SELECT_INBOX)
            .write(b"A0003 UID SEARCH ALL\r\n")
            .read(b"* SEARCH 3 7 11\r\nA0003 OK SEARCH completed\r\n")
            .write(b"A0004 UID FETCH 7,11 (UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[])\r\n")
            .read(b"* 3 FETCH (UID 11 FLAGS (\\Seen) RFC822.SIZE 16 BODY[] {16}\r\nSubject: new\r\n\r\n)\r\n")
            .read(b"* 2 FETCH (UID 7 FLAGS () RFC822.SIZE 40)\r\n")
            .read(b"A0004 OK FETCH completed\r\n")
            .build();
        let mut adapter = adapter(mock).await;

        let batch = adapter.fetch_messages("INBOX", 2, false).await.unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.messages[0].id, MessageId::imap("INBOX", 11));
        assert_eq!(batch.messages[0].subject, "new");
        assert!(!batch.messages[0].is_unread());
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].id, MessageId::imap("INBOX", 7));
    }

    #[tokio::test]
    async fn test_select_reused_for_same_folder() {
        let mut builder = Builder::new();
        let mock = login(&mut builder)
            .write(b"A0002 SELECT INBOX\r\n")
            .read(SELECT_INBOX)
            .write(b"A0003 UID STORE 5 +FLAGS.SILENT (\\Seen)\r\n")
            .read(b"A0003 OK STORE completed\r\n")
            .write(b"A0004 UID STORE 5 -FLAGS.SILENT (\\Seen)\r\n")
            .read(b"A0004 OK STORE completed\r\n")
            .build();
        let mut adapter = adapter(mock).await;

        let id = MessageId::imap("INBOX", 5);
        adapter.mark_as_read(&id).await.unwrap();
        adapter.mark_as_unread(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_expunges() {
        let mut builder = Builder::new();
        let mock = login(&mut builder)
            .write(b"A0002 SELECT INBOX\r\n")
            .read(SELECT_INBOX)
            .write(b"A0003 UID STORE 5 +FLAGS.SILENT (\\Deleted)\r\n")
            .read(b"A0003 OK STORE completed\r\n")
            .write(b"A0004 EXPUNGE\r\n")
            .read(b"* 2 EXPUNGE\r\nA0004 OK EXPUNGE completed\r\n")
            .build();
        let mut adapter = adapter(mock).await;

        adapter
            .delete_message(&MessageId::imap("INBOX", 5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_expunges_only_target_with_uidplus() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1 UIDPLUS] ready\r\n")
            .write(b"A0001 LOGIN user@example.com secret\r\n")
            .read(b"A0001 OK Logged in\r\n")
            .write(b"A0002 SELECT INBOX\r\n")
            .read(SELECT_INBOX)
            .write(b"A0003 UID STORE 5 +FLAGS.SILENT (\\Deleted)\r\n")
            .read(b"A0003 OK STORE completed\r\n")
            .write(b"A0004 UID EXPUNGE 5\r\n")
            .read(b"* 2 EXPUNGE\r\nA0004 OK EXPUNGE completed\r\n")
            .build();
        let mut adapter = adapter(mock).await;

        adapter
            .delete_message(&MessageId::imap("INBOX", 5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_and_unread_count() {
        let mut builder = Builder::new();
        let mock = login(&mut builder)
            .write(b"A0002 LIST \"\" \"*\"\r\n")
            .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
            .read(b"* LIST (\\HasNoChildren \\Sent) \"/\" Outbox\r\n")
            .read(b"A0002 OK LIST completed\r\n")
            .write(b"A0003 STATUS INBOX (MESSAGES RECENT UNSEEN UIDNEXT UIDVALIDITY)\r\n")
            .read(b"* STATUS INBOX (MESSAGES 12 RECENT 0 UNSEEN 3 UIDNEXT 40 UIDVALIDITY 9)\r\n")
            .read(b"A0003 OK STATUS completed\r\n")
            .build();
        let mut adapter = adapter(mock).await;

        let folders = adapter.list_folders().await.unwrap();
        assert_eq!(folders[0].kind, FolderKind::Inbox);
        assert_eq!(folders[1].kind, FolderKind::Sent);
        assert_eq!(adapter.unread_count("INBOX").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_select_drops_session() {
        let mut builder = Builder::new();
        let mock = login(&mut builder)
            .write(b"A0002 SELECT Nowhere\r\n")
            .read(b"A0002 NO Mailbox does not exist\r\n")
            .build();
        let mut adapter = adapter(mock).await;

        let err = adapter.fetch_messages("Nowhere", 5, false).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(!adapter.is_connected());
        assert!(matches!(
            adapter.list_folders().await.unwrap_err(),
            Error::Connection(_)
        ));
    }

    #[tokio::test]
    async fn test_login_refused_is_auth_error() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0001 LOGIN user@example.com secret\r\n")
            .read(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let mut adapter =
            ImapAdapter::new(account(), Some(Credential::Password("secret".into())));
        let client = Client::from_stream(mock).await.unwrap();

        let err = adapter.start(client).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let mock = Builder::new().read(GREETING).build();
        let mut adapter = ImapAdapter::<Mock>::new(account(), None);
        let client = Client::from_stream(mock).await.unwrap();

        let err = adapter.start(client).await.unwrap_err();
        assert!(matches!(err, Error::ReauthRequired(_)));
    }

    #[tokio::test]
    async fn test_zero_limit_and_pop3_id() {
        let mut builder = Builder::new();
        let mock = login(&mut builder).build();
        let mut adapter = adapter(mock).await;

        assert!(adapter.fetch_messages("INBOX", 0, false).await.unwrap().is_empty());
        let err = adapter
            .mark_as_read(&MessageId::pop3("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_port_before_socket() {
        let mut account = account();
        account.settings.incoming_port = 70000;
        let mut adapter =
            ImapAdapter::<ImapStream>::new(account, Some(Credential::Password("x".into())));

        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(_)));
    }
}
