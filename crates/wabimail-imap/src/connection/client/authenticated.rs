//! Mailbox-level commands.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::states::{Authenticated, Selected, Session};
use super::{Client, mailbox_status};
use crate::command::CommandLine;
use crate::parser::Untagged;
use crate::types::{Folder, StatusInfo};
use crate::{Error, Result};

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
    State: Session,
{
    /// Lists folders matching `pattern` (`*` for all) under `reference`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the command.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<Folder>> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "LIST")
            .mailbox(reference)
            .mailbox(pattern)
            .finish();
        let untagged = self.execute(&tag, command).await?.ok()?;
        Ok(untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::List(folder) => Some(folder),
                _ => None,
            })
            .collect())
    }

    /// Counters for a mailbox without selecting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox does not exist.
    pub async fn status(&mut self, mailbox: &str) -> Result<StatusInfo> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "STATUS")
            .mailbox(mailbox)
            .raw("(MESSAGES RECENT UNSEEN UIDNEXT UIDVALIDITY)")
            .finish();
        let untagged = self.execute(&tag, command).await?.ok()?;
        untagged
            .into_iter()
            .find_map(|u| match u {
                Untagged::MailboxStatus { info, .. } => Some(info),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("STATUS returned no data".into()))
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Opens a mailbox read-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected. The connection
    /// is consumed either way.
    pub async fn select(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, "SELECT").await
    }

    /// Opens a mailbox read-only; reading bodies does not set `\Seen`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be examined.
    pub async fn examine(self, mailbox: &str) -> Result<Client<S, Selected>> {
        self.open(mailbox, "EXAMINE").await
    }

    pub(crate) async fn open(mut self, mailbox: &str, verb: &str) -> Result<Client<S, Selected>> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, verb).mailbox(mailbox).finish();
        let completion = self.execute(&tag, command).await?;
        let mut status = mailbox_status(&completion);
        status.read_only |= verb == "EXAMINE";
        completion.ok()?;

        debug!(mailbox, exists = status.exists, "mailbox opened");
        Ok(self.into_state(Selected {
            mailbox: mailbox.to_string(),
            status,
        }))
    }
}
