//! Greeting, STARTTLS and authentication.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use wabimail_oauth::sasl::{decode_xoauth2_challenge, xoauth2_response};

use super::states::{Authenticated, NotAuthenticated};
use super::{Client, Completion};
use crate::command::{CommandLine, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::{Config, ImapStream, Security};
use crate::parser::{self, Response, ResponseCode, Status, Untagged};
use crate::{Error, Result};

impl Client<ImapStream, NotAuthenticated> {
    /// Connects according to `config`, reads the greeting and performs
    /// STARTTLS when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, handshake or greeting fails.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream = ImapStream::connect(
            &config.host,
            config.port,
            config.security,
            config.connect_timeout,
        )
        .await?;

        let greeting = tokio::time::timeout(config.connect_timeout, Self::from_stream(stream))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
        let client = greeting.with_io_timeout(Some(config.io_timeout));

        if config.security == Security::StartTls {
            client.starttls(&config.host).await
        } else {
            Ok(client)
        }
    }

    /// Upgrades the connection with STARTTLS and refreshes capabilities,
    /// which must not be trusted from before the upgrade.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not offer STARTTLS or the
    /// handshake fails.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if !self.has_capability("STARTTLS") {
            return Err(Error::Protocol("server does not offer STARTTLS".into()));
        }

        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "STARTTLS").finish();
        self.execute(&tag, command).await?.ok()?;

        let upgraded = self.stream.into_inner().upgrade_to_tls(host).await?;
        let mut client = Self {
            stream: FramedStream::new(upgraded),
            tags: self.tags,
            capabilities: Vec::new(),
            io_timeout: self.io_timeout,
            state: NotAuthenticated,
        };
        client.capability().await?;
        Ok(client)
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the server greets with BYE or something that is
    /// not a greeting.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);
        let greeting = framed.read_response().await?;

        let capabilities = match parser::parse(&greeting)? {
            Response::Untagged(Untagged::Status {
                status: Status::Ok | Status::PreAuth,
                code,
                text,
            }) => {
                debug!(greeting = %text, "server ready");
                match code {
                    Some(ResponseCode::Capability(caps)) => caps,
                    _ => Vec::new(),
                }
            }
            Response::Untagged(Untagged::Status {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            other => return Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
        };

        Ok(Self {
            stream: framed,
            tags: TagGenerator::default(),
            capabilities,
            io_timeout: None,
            state: NotAuthenticated,
        })
    }

    /// Logs in with a username and password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the server refuses the credentials or
    /// advertises `LOGINDISABLED`.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        if self.has_capability("LOGINDISABLED") {
            return Err(Error::Auth("LOGIN is disabled on this connection".into()));
        }

        let tag = self.tags.next();
        let command = CommandLine::new(&tag, "LOGIN")
            .astring(username)
            .astring(password)
            .finish();
        let completion = self.execute(&tag, command).await?;
        self.finish_auth(completion, username)
    }

    /// Authenticates with `AUTHENTICATE XOAUTH2` and a bearer token.
    ///
    /// Uses the initial-response form when the server has `SASL-IR`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if the token is refused.
    pub async fn authenticate_xoauth2(
        mut self,
        username: &str,
        access_token: &str,
    ) -> Result<Client<S, Authenticated>> {
        let initial = xoauth2_response(username, access_token);
        let tag = self.tags.next();

        let mut line = format!("{tag} AUTHENTICATE XOAUTH2");
        let send_inline = self.has_capability("SASL-IR");
        if send_inline {
            line.push(' ');
            line.push_str(&initial);
        }
        line.push_str("\r\n");
        debug!(tag = %tag, "sending AUTHENTICATE XOAUTH2");
        self.stream.write_all(line.as_bytes()).await?;

        if !send_inline {
            self.await_continuation(&tag).await?;
            self.stream
                .write_all(format!("{initial}\r\n").as_bytes())
                .await?;
        }

        // A refused token comes back as a continuation carrying a JSON
        // error; the client must answer with an empty line.
        let completion = loop {
            let raw = self.stream.read_response().await?;
            match parser::parse(&raw)? {
                Response::Continuation(challenge) => {
                    if let Some(failure) = decode_xoauth2_challenge(&challenge) {
                        warn!(status = %failure.status, "XOAUTH2 token rejected");
                    }
                    self.stream.write_all(b"\r\n").await?;
                }
                Response::Tagged {
                    tag: done,
                    status,
                    code,
                    text,
                } if done == tag => {
                    break Completion {
                        untagged: Vec::new(),
                        status,
                        code,
                        text,
                    };
                }
                Response::Untagged(item) => debug!(?item, "untagged during AUTHENTICATE"),
                Response::Tagged { .. } => {}
            }
        };
        self.finish_auth(completion, username)
    }

    fn finish_auth(
        mut self,
        completion: Completion,
        username: &str,
    ) -> Result<Client<S, Authenticated>> {
        match completion.status {
            Status::Ok => {
                info!(username, "IMAP authenticated");
                self.absorb_capabilities(&completion);
                Ok(self.into_state(Authenticated))
            }
            Status::Bye => Err(Error::Bye(completion.text)),
            _ => Err(Error::Auth(completion.text)),
        }
    }
}
