//! Message-level commands on the open mailbox.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::states::{Authenticated, Selected};
use super::{Client, check_flags};
use crate::command::{CommandLine, Segment, uid_set};
use crate::parser::Untagged;
use crate::types::{FetchedMessage, Flag, MailboxStatus, SearchCriteria, StoreAction};
use crate::{Error, Result};

/// Items fetched for a full message without touching `\Seen`.
const FULL_MESSAGE: &str = "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[])";

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Name of the open mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        self.state.mailbox()
    }

    /// Snapshot from SELECT/EXAMINE.
    #[must_use]
    pub const fn mailbox_status(&self) -> &MailboxStatus {
        self.state.status()
    }

    /// Opens another mailbox on the same connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected.
    pub async fn select(self, mailbox: &str) -> Result<Self> {
        self.into_state(Authenticated).open(mailbox, "SELECT").await
    }

    /// Closes the mailbox, expunging `\Deleted` messages if it was opened
    /// read-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects CLOSE.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "CLOSE").finish();
        self.execute(&tag, command).await?.ok()?;
        Ok(self.into_state(Authenticated))
    }

    /// UIDs of messages matching `criteria`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the search.
    pub async fn uid_search(&mut self, criteria: SearchCriteria) -> Result<Vec<u32>> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "UID SEARCH")
            .raw(criteria.as_str())
            .finish();
        let untagged = self.execute(&tag, command).await?.ok()?;
        let mut uids: Vec<u32> = untagged
            .into_iter()
            .flat_map(|u| match u {
                Untagged::Search(ids) => ids,
                _ => Vec::new(),
            })
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// Fetches complete messages by UID with `BODY.PEEK[]`.
    ///
    /// Messages the server no longer has are simply missing from the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the fetch.
    pub async fn uid_fetch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>> {
        let Some(set) = uid_set(uids) else {
            return Ok(Vec::new());
        };
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "UID FETCH")
            .raw(&set)
            .raw(FULL_MESSAGE)
            .finish();
        let untagged = self.execute(&tag, command).await?.ok()?;
        let messages: Vec<FetchedMessage> = untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::Fetch(message) if message.uid.is_some() => Some(message),
                _ => None,
            })
            .collect();
        debug!(requested = uids.len(), received = messages.len(), "fetched");
        Ok(messages)
    }

    /// Adds, removes or replaces flags on messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for flags that cannot be stored,
    /// [`Error::InvalidState`] on a read-only mailbox, or the server's
    /// refusal.
    pub async fn uid_store(&mut self, uids: &[u32], action: StoreAction, flags: &[Flag]) -> Result<()> {
        let list = check_flags(flags)?;
        self.ensure_writable()?;
        let Some(set) = uid_set(uids) else {
            return Ok(());
        };

        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "UID STORE")
            .raw(&set)
            .raw(action.as_str())
            .raw(&list)
            .finish();
        self.execute(&tag, command).await?.ok()?;
        Ok(())
    }

    /// Permanently removes `\Deleted` messages; returns the expunged
    /// sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns an error on a read-only mailbox or if the server refuses.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        self.ensure_writable()?;
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "EXPUNGE").finish();
        self.run_expunge(&tag, command).await
    }

    /// Removes only the given `\Deleted` messages with `UID EXPUNGE` when
    /// the server has UIDPLUS. Without it this falls back to a plain
    /// EXPUNGE, which also removes other `\Deleted` messages.
    ///
    /// # Errors
    ///
    /// Returns an error on a read-only mailbox or if the server refuses.
    pub async fn uid_expunge(&mut self, uids: &[u32]) -> Result<Vec<u32>> {
        if !self.supports_uidplus() {
            debug!("no UIDPLUS, expunging the whole mailbox");
            return self.expunge().await;
        }
        self.ensure_writable()?;
        let Some(set) = uid_set(uids) else {
            return Ok(Vec::new());
        };
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "UID EXPUNGE").raw(&set).finish();
        self.run_expunge(&tag, command).await
    }

    async fn run_expunge(&mut self, tag: &str, command: Vec<Segment>) -> Result<Vec<u32>> {
        let untagged = self.execute(tag, command).await?.ok()?;
        Ok(untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::Expunge(seq) => Some(seq),
                _ => None,
            })
            .collect())
    }

    /// Copies messages to another mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination does not exist.
    pub async fn uid_copy(&mut self, uids: &[u32], destination: &str) -> Result<()> {
        self.transfer("UID COPY", uids, destination).await
    }

    /// Moves messages to another mailbox: `UID MOVE` when the server has
    /// MOVE, otherwise COPY, flag `\Deleted` and EXPUNGE.
    ///
    /// # Errors
    ///
    /// Returns an error if any step is refused.
    pub async fn uid_move(&mut self, uids: &[u32], destination: &str) -> Result<()> {
        if self.supports_move() {
            self.ensure_writable()?;
            return self.transfer("UID MOVE", uids, destination).await;
        }
        self.uid_copy(uids, destination).await?;
        self.uid_store(uids, StoreAction::Add, &[Flag::Deleted])
            .await?;
        self.uid_expunge(uids).await?;
        Ok(())
    }

    async fn transfer(&mut self, verb: &str, uids: &[u32], destination: &str) -> Result<()> {
        let Some(set) = uid_set(uids) else {
            return Ok(());
        };
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, verb)
            .raw(&set)
            .mailbox(destination)
            .finish();
        self.execute(&tag, command).await?.ok()?;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.state.is_read_only() {
            return Err(Error::InvalidState(format!(
                "{} is open read-only",
                self.state.mailbox()
            )));
        }
        Ok(())
    }
}
