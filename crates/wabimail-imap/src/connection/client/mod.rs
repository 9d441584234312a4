//! Type-state IMAP client.
//!
//! The connection state is part of the type:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN / AUTHENTICATE
//! - `Selected`: after SELECT / EXAMINE
//!
//! Each state only exposes the commands valid in it.

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

pub use self::states::{Authenticated, NotAuthenticated, Selected, Session};
use super::framed::FramedStream;
use crate::command::{CommandLine, Segment, TagGenerator};
use crate::parser::{self, Response, ResponseCode, Status, Untagged};
use crate::types::{Flag, MailboxStatus};
use crate::{Error, Result};

/// IMAP client connection in state `State`.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tags: TagGenerator,
    pub(crate) capabilities: Vec<String>,
    pub(crate) io_timeout: Option<Duration>,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// The tagged completion of a command and the data sent before it.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) untagged: Vec<Untagged>,
    pub(crate) status: Status,
    pub(crate) code: Option<ResponseCode>,
    pub(crate) text: String,
}

impl Completion {
    /// Untagged data of a successful command; NO/BAD/BYE become errors.
    pub(crate) fn ok(self) -> Result<Vec<Untagged>> {
        match status_error(self.status, self.text) {
            None => Ok(self.untagged),
            Some(e) => Err(e),
        }
    }
}

fn status_error(status: Status, text: String) -> Option<Error> {
    match status {
        Status::Ok | Status::PreAuth => None,
        Status::No => Some(Error::No(text)),
        Status::Bad => Some(Error::Bad(text)),
        Status::Bye => Some(Error::Bye(text)),
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Capabilities as last reported by the server.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Case-insensitive capability check.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// RFC 6851 MOVE.
    #[must_use]
    pub fn supports_move(&self) -> bool {
        self.has_capability("MOVE")
    }

    /// RFC 4315 UIDPLUS, which adds `UID EXPUNGE`.
    #[must_use]
    pub fn supports_uidplus(&self) -> bool {
        self.has_capability("UIDPLUS")
    }

    /// `AUTH=<mechanism>` is advertised.
    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.has_capability(&format!("AUTH={mechanism}"))
    }

    /// Limits every command round trip; `None` waits indefinitely.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer OK.
    pub async fn noop(&mut self) -> Result<()> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "NOOP").finish();
        self.execute(&tag, command).await?.ok()?;
        Ok(())
    }

    /// Refreshes the capability list.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer OK.
    pub async fn capability(&mut self) -> Result<&[String]> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "CAPABILITY").finish();
        let untagged = self.execute(&tag, command).await?.ok()?;
        for item in untagged {
            if let Untagged::Capability(caps) = item {
                self.capabilities = caps;
            }
        }
        Ok(&self.capabilities)
    }

    /// Sends LOGOUT and drops the connection.
    ///
    /// # Errors
    ///
    /// The server may close before completing LOGOUT, so failures after
    /// the command is written are ignored; only a failed write is
    /// reported.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "LOGOUT").finish();
        match self.execute(&tag, command).await {
            Err(Error::Io(e)) if e.kind() != std::io::ErrorKind::UnexpectedEof => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }

    /// Moves the connection into another state.
    pub(crate) fn into_state<T>(self, state: T) -> Client<S, T> {
        Client {
            stream: self.stream,
            tags: self.tags,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            state,
        }
    }

    /// Takes capabilities reported alongside a command's responses.
    pub(crate) fn absorb_capabilities(&mut self, completion: &Completion) {
        let from_code = match &completion.code {
            Some(ResponseCode::Capability(caps)) => Some(caps),
            _ => None,
        };
        let from_untagged = completion.untagged.iter().find_map(|u| match u {
            Untagged::Capability(caps)
            | Untagged::Status {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => Some(caps),
            _ => None,
        });
        if let Some(caps) = from_code.or(from_untagged) {
            self.capabilities.clone_from(caps);
        }
    }

    /// Sends a command and reads up to its tagged completion, within the
    /// I/O timeout.
    pub(crate) async fn execute(&mut self, tag: &str, segments: Vec<Segment>) -> Result<Completion> {
        match self.io_timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(tag, segments))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.exchange(tag, segments).await,
        }
    }

    async fn exchange(&mut self, tag: &str, segments: Vec<Segment>) -> Result<Completion> {
        for segment in segments {
            match segment {
                Segment::Text(text) => {
                    debug!(command = %redact(&text), "sending");
                    self.stream.write_all(text.as_bytes()).await?;
                }
                Segment::Literal(bytes) => {
                    self.await_continuation(tag).await?;
                    self.stream.write_all(&bytes).await?;
                }
            }
        }
        self.read_completion(tag).await
    }

    /// Waits for `+` before sending a literal.
    pub(crate) async fn await_continuation(&mut self, tag: &str) -> Result<String> {
        loop {
            let raw = self.stream.read_response().await?;
            match parser::parse(&raw)? {
                Response::Continuation(text) => return Ok(text),
                Response::Tagged {
                    tag: done,
                    status,
                    text,
                    ..
                } if done == tag => {
                    return Err(status_error(status, text).unwrap_or_else(|| {
                        Error::Protocol("command completed before literal was sent".into())
                    }));
                }
                other => debug!(?other, "ignoring response while waiting for continuation"),
            }
        }
    }

    /// Collects untagged data until the tagged completion for `tag`.
    pub(crate) async fn read_completion(&mut self, tag: &str) -> Result<Completion> {
        let mut untagged = Vec::new();
        loop {
            let raw = self.stream.read_response().await?;
            match parser::parse(&raw) {
                Ok(Response::Untagged(item)) => untagged.push(item),
                Ok(Response::Tagged {
                    tag: done,
                    status,
                    code,
                    text,
                }) if done == tag => {
                    debug!(tag, ?status, "completed");
                    return Ok(Completion {
                        untagged,
                        status,
                        code,
                        text,
                    });
                }
                Ok(Response::Tagged { tag: other, .. }) => {
                    warn!(expected = tag, got = %other, "ignoring completion for unknown tag");
                }
                Ok(Response::Continuation(_)) => {
                    return Err(Error::Protocol("unexpected continuation request".into()));
                }
                Err(e) => warn!(error = %e, "skipping unparseable response"),
            }
        }
    }
}

/// Hides LOGIN arguments from logs.
fn redact(command: &str) -> String {
    let mut words = command.splitn(3, ' ');
    match (words.next(), words.next()) {
        (Some(tag), Some(name))
            if name.eq_ignore_ascii_case("LOGIN") || name.eq_ignore_ascii_case("AUTHENTICATE") =>
        {
            format!("{tag} {name} ***")
        }
        _ => command.trim_end().to_string(),
    }
}

/// Folds SELECT/EXAMINE data into a status snapshot.
pub(crate) fn mailbox_status(completion: &Completion) -> MailboxStatus {
    let mut status = MailboxStatus {
        read_only: matches!(completion.code, Some(ResponseCode::ReadOnly)),
        ..MailboxStatus::default()
    };
    for item in &completion.untagged {
        match item {
            Untagged::Exists(n) => status.exists = *n,
            Untagged::Recent(n) => status.recent = *n,
            Untagged::Flags(flags) => status.flags.clone_from(flags),
            Untagged::Status {
                code: Some(code), ..
            } => match code {
                ResponseCode::UidValidity(v) => status.uid_validity = Some(*v),
                ResponseCode::UidNext(v) => status.uid_next = Some(*v),
                ResponseCode::Unseen(v) => status.first_unseen = Some(*v),
                _ => {}
            },
            _ => {}
        }
    }
    status
}

/// Rejects flags that cannot be sent with STORE.
pub(crate) fn check_flags(flags: &[Flag]) -> Result<String> {
    if let Some(bad) = flags.iter().find(|f| !f.is_valid() || !f.is_storable()) {
        return Err(Error::InvalidArgument(format!("flag {bad} cannot be stored")));
    }
    let list: Vec<&str> = flags.iter().map(Flag::as_str).collect();
    Ok(format!("({})", list.join(" ")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(redact("A0001 LOGIN user secret\r\n"), "A0001 LOGIN ***");
        assert_eq!(
            redact("A0002 AUTHENTICATE XOAUTH2 dXNlcj1...\r\n"),
            "A0002 AUTHENTICATE ***"
        );
        assert_eq!(redact("A0003 SELECT INBOX\r\n"), "A0003 SELECT INBOX");
    }

    #[test]
    fn test_check_flags() {
        assert_eq!(
            check_flags(&[Flag::Seen, Flag::Keyword("$Work".into())]).unwrap(),
            "(\\Seen $Work)"
        );
        assert!(check_flags(&[Flag::Recent]).is_err());
        assert!(check_flags(&[Flag::Keyword("a b".into())]).is_err());
    }

    #[test]
    fn test_completion_ok() {
        let completion = Completion {
            untagged: vec![Untagged::Exists(1)],
            status: Status::No,
            code: None,
            text: "Mailbox doesn't exist".into(),
        };
        assert!(matches!(completion.ok(), Err(Error::No(t)) if t.contains("doesn't")));
    }
}
