//! Type-state POP3 client.
//!
//! `Authorization` after the greeting, `Transaction` after USER/PASS or
//! AUTH. Deletions are only committed by QUIT from the transaction state.

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use wabimail_oauth::sasl::{decode_xoauth2_challenge, xoauth2_response};

use super::{Config, Pop3Stream, Security};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{Status, parse_list_entry, parse_stat, parse_status, parse_uidl_entry, unstuff};
use crate::types::{ListEntry, Stat, UidlEntry};

/// Longest line accepted; RFC 1939 allows 512 octets but real servers
/// send longer message lines.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Greeted, not logged in.
#[derive(Debug)]
pub struct Authorization;

/// Logged in; the maildrop is locked.
#[derive(Debug)]
pub struct Transaction;

/// POP3 client in state `State` over stream `S`.
pub struct Client<S, State> {
    reader: BufReader<S>,
    greeting: String,
    capabilities: Vec<String>,
    io_timeout: Option<Duration>,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("greeting", &self.greeting)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Client<Pop3Stream, Authorization> {
    /// Connects according to `config`, reads the greeting and performs
    /// STLS when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake or greeting fails.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream =
            Pop3Stream::connect(&config.host, config.port, config.security, config.connect_timeout)
                .await?;
        let greeted = tokio::time::timeout(config.connect_timeout, Self::from_stream(stream))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
        let client = greeted.with_io_timeout(Some(config.io_timeout));

        if config.security == Security::StartTls {
            client.stls(&config.host).await
        } else {
            Ok(client)
        }
    }

    /// Upgrades the connection with STLS and refreshes capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server refuses STLS, or an
    /// error if the handshake fails.
    pub async fn stls(mut self, host: &str) -> Result<Self> {
        match self.round_trip(&Command::Stls).await? {
            (Status::Ok(_), _) => {}
            (Status::Err(text), _) => return Err(Error::NotSupported(format!("STLS: {text}"))),
            (Status::Continuation(_), _) => return Err(unexpected_continuation()),
        }

        let upgraded = self.reader.into_inner().upgrade_to_tls(host).await?;
        let mut client = Self {
            reader: BufReader::new(upgraded),
            greeting: self.greeting,
            capabilities: Vec::new(),
            io_timeout: self.io_timeout,
            _state: PhantomData,
        };
        client.capa().await?;
        Ok(client)
    }
}

impl<S> Client<S, Authorization>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the `+OK` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the server greets with anything but `+OK`.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut reader = BufReader::new(stream);
        let line = read_line(&mut reader).await?;
        let greeting = match parse_status(&String::from_utf8_lossy(&line))? {
            Status::Ok(text) => text,
            Status::Err(text) => return Err(Error::Server(text)),
            Status::Continuation(_) => return Err(unexpected_continuation()),
        };
        debug!(greeting = %greeting, "server ready");

        Ok(Self {
            reader,
            greeting,
            capabilities: Vec::new(),
            io_timeout: None,
            _state: PhantomData,
        })
    }

    /// Logs in with USER and PASS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if either command is refused.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Transaction>> {
        if username.contains(['\r', '\n']) || password.contains(['\r', '\n']) {
            return Err(Error::InvalidArgument("credentials contain a line break".into()));
        }
        for command in [Command::User(username.to_string()), Command::Pass(password.to_string())] {
            match self.round_trip(&command).await? {
                (Status::Ok(_), _) => {}
                (Status::Err(text), _) => return Err(Error::Auth(text)),
                (Status::Continuation(_), _) => return Err(unexpected_continuation()),
            }
        }
        info!(username, "POP3 authenticated");
        Ok(self.into_state())
    }

    /// Authenticates with `AUTH XOAUTH2` and a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the token is refused.
    pub async fn auth_xoauth2(mut self, username: &str, access_token: &str) -> Result<Client<S, Transaction>> {
        let command = Command::Auth {
            mechanism: "XOAUTH2",
            initial_response: xoauth2_response(username, access_token),
        };
        let mut status = self.round_trip(&command).await?.0;

        // A refused token comes back as a challenge carrying a JSON error;
        // the client must answer with an empty line.
        if let Status::Continuation(challenge) = &status {
            if let Some(failure) = decode_xoauth2_challenge(challenge) {
                warn!(status = %failure.status, "XOAUTH2 token rejected");
            }
            status = self.exchange(b"\r\n", false).await?.0;
        }

        match status {
            Status::Ok(_) => {
                info!(username, "POP3 authenticated with XOAUTH2");
                Ok(self.into_state())
            }
            Status::Err(text) => Err(Error::Auth(text)),
            Status::Continuation(_) => Err(unexpected_continuation()),
        }
    }
}

impl<S> Client<S, Transaction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Message count and total size.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses or the answer is malformed.
    pub async fn stat(&mut self) -> Result<Stat> {
        let text = self.expect_ok(&Command::Stat).await?.0;
        parse_stat(&text)
    }

    /// Sizes of all messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses or a line is malformed.
    pub async fn list(&mut self) -> Result<Vec<ListEntry>> {
        let block = self.expect_ok(&Command::List(None)).await?.1;
        block
            .iter()
            .map(|line| parse_list_entry(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Unique ids of all messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server has no UIDL, or an
    /// error if a line is malformed.
    pub async fn uidl(&mut self) -> Result<Vec<UidlEntry>> {
        let block = match self.round_trip(&Command::Uidl(None)).await? {
            (Status::Ok(_), block) => block,
            (Status::Err(text), _) => return Err(Error::NotSupported(format!("UIDL: {text}"))),
            (Status::Continuation(_), _) => return Err(unexpected_continuation()),
        };
        block
            .iter()
            .map(|line| parse_uidl_entry(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Full message, unstuffed, with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if the message does not exist.
    pub async fn retr(&mut self, number: u32) -> Result<Vec<u8>> {
        let block = self.expect_ok(&Command::Retr(number)).await?.1;
        Ok(join_lines(&block))
    }

    /// Headers plus the first `lines` body lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if the message does not exist or TOP is
    /// not supported.
    pub async fn top(&mut self, number: u32, lines: u32) -> Result<Vec<u8>> {
        let block = self.expect_ok(&Command::Top(number, lines)).await?.1;
        Ok(join_lines(&block))
    }

    /// Marks a message deleted; it is removed when the session ends with
    /// QUIT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if the message does not exist.
    pub async fn dele(&mut self, number: u32) -> Result<()> {
        self.expect_ok(&Command::Dele(number)).await.map(|_| ())
    }

    /// Unmarks every message marked deleted in this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses.
    pub async fn rset(&mut self) -> Result<()> {
        self.expect_ok(&Command::Rset).await.map(|_| ())
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses.
    pub async fn noop(&mut self) -> Result<()> {
        self.expect_ok(&Command::Noop).await.map(|_| ())
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Text of the greeting.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Capabilities from the last CAPA.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Case-insensitive check of the first word of each capability line.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| {
            c.split_whitespace()
                .next()
                .is_some_and(|w| w.eq_ignore_ascii_case(name))
        })
    }

    /// Limits every command round trip; `None` waits indefinitely.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Refreshes capabilities with CAPA. Servers without CAPA yield an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn capa(&mut self) -> Result<&[String]> {
        self.capabilities = match self.round_trip(&Command::Capa).await? {
            (Status::Ok(_), block) => block
                .iter()
                .map(|line| String::from_utf8_lossy(line).into_owned())
                .collect(),
            _ => Vec::new(),
        };
        Ok(&self.capabilities)
    }

    /// Ends the session. From the transaction state this commits
    /// deletions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if the server could not remove deleted
    /// messages, or an I/O error if QUIT could not be written.
    pub async fn quit(mut self) -> Result<()> {
        match self.round_trip(&Command::Quit).await {
            Ok((Status::Err(text), _)) => Err(Error::Server(text)),
            Err(Error::Io(e)) if e.kind() != std::io::ErrorKind::UnexpectedEof => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }

    fn into_state<T>(self) -> Client<S, T> {
        Client {
            reader: self.reader,
            greeting: self.greeting,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            _state: PhantomData,
        }
    }

    async fn expect_ok(&mut self, command: &Command) -> Result<(String, Vec<Vec<u8>>)> {
        match self.round_trip(command).await? {
            (Status::Ok(text), block) => Ok((text, block)),
            (Status::Err(text), _) => Err(Error::Server(text)),
            (Status::Continuation(_), _) => Err(unexpected_continuation()),
        }
    }

    async fn round_trip(&mut self, command: &Command) -> Result<(Status, Vec<Vec<u8>>)> {
        debug!(command = %command.redacted(), "sending");
        self.exchange(command.serialize().as_bytes(), command.is_multiline())
            .await
    }

    /// Writes bytes, reads the status line and, for a positive answer to
    /// a multi-line command, the dot-terminated block.
    async fn exchange(&mut self, data: &[u8], multiline: bool) -> Result<(Status, Vec<Vec<u8>>)> {
        let io_timeout = self.io_timeout;
        let reader = &mut self.reader;
        let round_trip = async move {
            let stream = reader.get_mut();
            stream.write_all(data).await?;
            stream.flush().await?;

            let line = read_line(reader).await?;
            let status = parse_status(&String::from_utf8_lossy(&line))?;
            let mut block = Vec::new();
            if multiline && matches!(status, Status::Ok(_)) {
                loop {
                    let line = read_line(reader).await?;
                    if line == b"." {
                        break;
                    }
                    block.push(unstuff(&line).to_vec());
                }
            }
            Ok((status, block))
        };
        match io_timeout {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => round_trip.await,
        }
    }
}

/// Reads one line and strips its line ending.
async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    if line.len() > MAX_LINE_LENGTH {
        return Err(Error::Protocol("line too long".into()));
    }
    if line.ends_with(b"\n") {
        line.pop();
    }
    if line.ends_with(b"\r") {
        line.pop();
    }
    Ok(line)
}

fn join_lines(lines: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lines.iter().map(|l| l.len() + 2).sum());
    for line in lines {
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn unexpected_continuation() -> Error {
    Error::Protocol("unexpected continuation".into())
}
