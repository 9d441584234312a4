//! Type-state SMTP client.
//!
//! `Connected` after the greeting and EHLO; `Authenticated` after AUTH.
//! Mail can be sent in both, since some relays accept unauthenticated
//! submission.

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use wabimail_oauth::sasl::{decode_xoauth2_challenge, plain_response, xoauth2_response};

use super::{Config, Security, SmtpStream};
use crate::command::{Command, dot_stuff};
use crate::error::{Error, Result};
use crate::parser::{is_last_line, parse_reply};
use crate::types::{Address, AuthMechanism, Capabilities, Delivery, RejectedRecipient, Reply, ReplyCode};

/// Longest reply line accepted.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Greeted, not authenticated.
#[derive(Debug)]
pub struct Connected;

/// Authenticated with AUTH.
#[derive(Debug)]
pub struct Authenticated;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Connected {}
    impl Sealed for super::Authenticated {}
}

/// States in which a mail transaction may start.
pub trait Ready: sealed::Sealed {}
impl Ready for Connected {}
impl Ready for Authenticated {}

/// SMTP client in state `State` over stream `S`.
pub struct Client<S, State> {
    reader: BufReader<S>,
    greeting: String,
    client_name: String,
    capabilities: Capabilities,
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

impl Client<SmtpStream, Connected> {
    /// Connects according to `config`, reads the greeting, sends EHLO and
    /// performs STARTTLS when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake, greeting or EHLO
    /// fails.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream =
            SmtpStream::connect(&config.host, config.port, config.security, config.connect_timeout)
                .await?;

        let greeted = tokio::time::timeout(config.connect_timeout, Self::from_stream(stream))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
        let client = greeted
            .with_io_timeout(Some(config.io_timeout))
            .ehlo(&config.client_name)
            .await?;

        if config.security == Security::StartTls {
            client.starttls(&config.host).await
        } else {
            Ok(client)
        }
    }

    /// Upgrades the connection with STARTTLS and repeats EHLO, since
    /// capabilities from before the upgrade must be discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not offered or the handshake fails.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if !self.capabilities.starttls {
            return Err(Error::NotSupported("STARTTLS".into()));
        }
        let reply = self.command(&Command::StartTls).await?;
        if !reply.is_success() {
            return Err(Error::reply(reply.code.as_u16(), reply.text()));
        }

        let upgraded = self.reader.into_inner().upgrade_to_tls(host).await?;
        let client = Self {
            reader: BufReader::new(upgraded),
            greeting: self.greeting,
            client_name: self.client_name.clone(),
            capabilities: Capabilities::default(),
            io_timeout: self.io_timeout,
            _state: PhantomData,
        };
        client.ehlo(&self.client_name).await
    }
}

impl<S> Client<S, Connected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the 220 greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the server greets with anything but 220.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut reader = BufReader::new(stream);
        let greeting = read_reply(&mut reader).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::reply(greeting.code.as_u16(), greeting.text()));
        }
        debug!(greeting = %greeting.text(), "server ready");

        Ok(Self {
            reader,
            greeting: greeting.text(),
            client_name: "localhost".to_string(),
            capabilities: Capabilities::default(),
            io_timeout: None,
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the advertised extensions. Falls back to
    /// HELO (no extensions) when the server rejects EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if both EHLO and HELO are refused.
    pub async fn ehlo(mut self, client_name: &str) -> Result<Self> {
        self.client_name = client_name.to_string();
        let reply = self.command(&Command::Ehlo(client_name.to_string())).await?;
        if reply.is_success() {
            self.capabilities = Capabilities::parse(&reply.lines);
            debug!(capabilities = ?self.capabilities, "EHLO");
            return Ok(self);
        }

        warn!(reply = %reply, "EHLO refused, trying HELO");
        let reply = self.command(&Command::Helo(client_name.to_string())).await?;
        if !reply.is_success() {
            return Err(Error::reply(reply.code.as_u16(), reply.text()));
        }
        self.capabilities = Capabilities::default();
        Ok(self)
    }

    /// Authenticates with AUTH PLAIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if PLAIN is not advertised, or
    /// [`Error::Auth`] if the credentials are refused.
    pub async fn auth_plain(self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        let response = plain_response(username, password);
        self.authenticate(AuthMechanism::Plain, response, username).await
    }

    /// Authenticates with AUTH XOAUTH2 and a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if XOAUTH2 is not advertised, or
    /// [`Error::Auth`] if the token is refused.
    pub async fn auth_xoauth2(self, username: &str, access_token: &str) -> Result<Client<S, Authenticated>> {
        let response = xoauth2_response(username, access_token);
        self.authenticate(AuthMechanism::XOAuth2, response, username).await
    }

    async fn authenticate(
        mut self,
        mechanism: AuthMechanism,
        initial_response: String,
        username: &str,
    ) -> Result<Client<S, Authenticated>> {
        if self.capabilities.auth.is_empty() {
            return Err(Error::NotSupported("AUTH".into()));
        }
        if !self.capabilities.supports_auth(mechanism) {
            return Err(Error::NotSupported(format!("AUTH {}", mechanism.as_str())));
        }

        let mut reply = self
            .command(&Command::Auth {
                mechanism,
                initial_response,
            })
            .await?;

        // A refused XOAUTH2 token comes back as a 334 challenge carrying a
        // JSON error; the client must answer with an empty line.
        if reply.code == ReplyCode::AUTH_CONTINUE {
            if let Some(failure) = reply.lines.first().and_then(|c| decode_xoauth2_challenge(c)) {
                warn!(status = %failure.status, "XOAUTH2 token rejected");
            }
            reply = self.exchange(b"\r\n").await?;
        }

        match reply.code.as_u16() {
            235 => {
                info!(username, mechanism = mechanism.as_str(), "SMTP authenticated");
                Ok(self.into_state())
            }
            421 => Err(Error::reply(421, reply.text())),
            code => Err(Error::Auth {
                code,
                message: reply.text(),
            }),
        }
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Extensions from the last EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Text of the 220 greeting.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Limits every command round trip; `None` waits indefinitely.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sends NOOP.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn noop(&mut self) -> Result<()> {
        let reply = self.command(&Command::Noop).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(Error::reply(reply.code.as_u16(), reply.text()))
        }
    }

    /// Sends QUIT and closes the connection. A connection the server has
    /// already dropped counts as closed.
    ///
    /// # Errors
    ///
    /// Returns an error only if QUIT could not be written.
    pub async fn quit(mut self) -> Result<()> {
        match self.command(&Command::Quit).await {
            Err(Error::Io(e)) if e.kind() != std::io::ErrorKind::UnexpectedEof => Err(Error::Io(e)),
            _ => Ok(()),
        }
    }

    fn into_state<T>(self) -> Client<S, T> {
        Client {
            reader: self.reader,
            greeting: self.greeting,
            client_name: self.client_name,
            capabilities: self.capabilities,
            io_timeout: self.io_timeout,
            _state: PhantomData,
        }
    }

    async fn command(&mut self, command: &Command) -> Result<Reply> {
        debug!(command = %command.redacted(), "sending");
        self.exchange(command.serialize().as_bytes()).await
    }

    /// Writes bytes and reads one reply, within the I/O timeout.
    async fn exchange(&mut self, data: &[u8]) -> Result<Reply> {
        let io_timeout = self.io_timeout;
        let reader = &mut self.reader;
        let round_trip = async move {
            let stream = reader.get_mut();
            stream.write_all(data).await?;
            stream.flush().await?;
            read_reply(reader).await
        };
        match io_timeout {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => round_trip.await,
        }
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
    State: Ready,
{
    /// Runs one mail transaction.
    ///
    /// Every recipient gets its own RCPT TO; refused recipients are
    /// reported in the [`Delivery`] rather than aborting the transaction.
    ///
    /// # Errors
    ///
    /// - [`Error::AllRecipientsRejected`] if no recipient was accepted
    /// - [`Error::MessageRejected`] if DATA or the content is refused
    /// - [`Error::MessageTooLarge`] if the message exceeds the server's SIZE
    /// - [`Error::Reply`] if MAIL FROM is refused
    pub async fn send_mail(&mut self, from: &Address, recipients: &[Address], message: &[u8]) -> Result<Delivery> {
        if recipients.is_empty() {
            return Err(Error::InvalidState("no recipients".into()));
        }
        if let Some(limit) = self.capabilities.size_limit() {
            if message.len() > limit {
                return Err(Error::MessageTooLarge {
                    size: message.len(),
                    limit,
                });
            }
        }
        let needs_utf8 = !from.is_ascii() || recipients.iter().any(|r| !r.is_ascii());
        if needs_utf8 && !self.capabilities.smtp_utf8 {
            return Err(Error::NotSupported("SMTPUTF8".into()));
        }

        let mail_from = Command::MailFrom {
            from: from.clone(),
            size: self.capabilities.size.map(|_| message.len()),
            eight_bit: !message.is_ascii() && self.capabilities.eight_bit_mime,
            smtp_utf8: needs_utf8,
        };
        let reply = self.command(&mail_from).await?;
        if !reply.is_success() {
            self.abort().await;
            return Err(Error::reply(reply.code.as_u16(), reply.text()));
        }

        let mut delivery = Delivery::default();
        for recipient in recipients {
            let reply = self.command(&Command::RcptTo(recipient.clone())).await?;
            if reply.is_success() {
                delivery.accepted.push(recipient.clone());
            } else if reply.code == ReplyCode::SERVICE_UNAVAILABLE {
                return Err(Error::reply(421, reply.text()));
            } else {
                warn!(recipient = %recipient, reply = %reply, "recipient rejected");
                delivery.rejected.push(RejectedRecipient {
                    address: recipient.clone(),
                    code: reply.code.as_u16(),
                    message: reply.text(),
                });
            }
        }
        if delivery.accepted.is_empty() {
            self.abort().await;
            return Err(Error::AllRecipientsRejected(delivery.rejected));
        }

        let reply = self.command(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            self.abort().await;
            return Err(Error::MessageRejected {
                code: reply.code.as_u16(),
                message: reply.text(),
            });
        }

        let reply = self.exchange(&dot_stuff(message)).await?;
        if !reply.is_success() {
            return Err(Error::MessageRejected {
                code: reply.code.as_u16(),
                message: reply.text(),
            });
        }

        info!(
            accepted = delivery.accepted.len(),
            rejected = delivery.rejected.len(),
            "message sent"
        );
        delivery.response = reply.text();
        Ok(delivery)
    }

    /// Abandons the current transaction with RSET.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn reset(&mut self) -> Result<()> {
        let reply = self.command(&Command::Rset).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(Error::reply(reply.code.as_u16(), reply.text()))
        }
    }

    async fn abort(&mut self) {
        if let Err(e) = self.reset().await {
            debug!(error = %e, "RSET after failed transaction");
        }
    }
}

/// Reads lines up to the last line of a reply.
async fn read_reply<R>(reader: &mut R) -> Result<Reply>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut raw = Vec::new();
        let n = reader.read_until(b'\n', &mut raw).await?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        if raw.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("reply line too long".into()));
        }
        let line = String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string();
        let last = is_last_line(&line);
        lines.push(line);
        if last {
            return parse_reply(&lines);
        }
    }
}
