//! SMTP send adapter.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use wabimail_mime::{Mailbox, MessageBuilder};
use wabimail_smtp::{Address, Authenticated, Client, Config, Connected, SmtpStream};

use super::message::{OutgoingMessage, RejectedRecipient, SendReport};
use super::{outgoing_config, require_credential};
use crate::account::{Account, AuthType, validate_outgoing};
use crate::auth::Credential;
use crate::config::NetworkTimeouts;
use crate::{Error, Result};

/// Value of the `X-Mailer` header.
pub const MAILER: &str = "WabiMail";

/// Separator placed between the body and the account signature.
const SIGNATURE_SEPARATOR: &str = "\n\n-- \n";

enum SmtpSession<S> {
    Open(Client<S, Connected>),
    Authenticated(Client<S, Authenticated>),
}

/// SMTP adapter; every account type sends through it.
pub struct SmtpAdapter<S = SmtpStream> {
    account: Account,
    credential: Option<Credential>,
    timeouts: NetworkTimeouts,
    session: Option<SmtpSession<S>>,
}

impl<S> std::fmt::Debug for SmtpAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpAdapter")
            .field("account", &self.account.email)
            .field("connected", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl SmtpAdapter<SmtpStream> {
    /// Validates the outgoing settings, connects (with STARTTLS when
    /// configured) and authenticates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] before any socket is opened if the
    /// host or port is unusable, [`Error::Connection`] on network failure
    /// and [`Error::Auth`] if the credentials are refused.
    pub async fn connect(&mut self) -> Result<()> {
        validate_outgoing(&self.account.settings).map_err(Error::InvalidSettings)?;
        if self.needs_auth() {
            require_credential(&self.account, self.credential.as_ref())?;
        }
        let (host, port, security) = outgoing_config(&self.account.settings)?;

        debug!(account = %self.account.email, host, port, "connecting to SMTP");
        let config = Config::new(host)
            .with_port(port)
            .with_security(security.into())
            .with_timeouts(self.timeouts.connect, self.timeouts.io);
        let client = Client::connect(&config).await?;
        self.start(client).await
    }
}

impl<S> SmtpAdapter<S>
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

    /// Authenticates on a client that has completed EHLO. AUTH PLAIN is
    /// used for passwords and AUTH XOAUTH2 for OAuth2 tokens; nothing is
    /// sent when the account does not require authentication.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReauthRequired`] without a credential,
    /// [`Error::Unsupported`] if the server offers no usable mechanism and
    /// [`Error::Auth`] if the credentials are refused.
    pub async fn start(&mut self, client: Client<S, Connected>) -> Result<()> {
        let client = client.with_io_timeout(Some(self.timeouts.io));
        if !self.needs_auth() {
            debug!(account = %self.account.email, "SMTP without authentication");
            self.session = Some(SmtpSession::Open(client));
            return Ok(());
        }

        let credential = require_credential(&self.account, self.credential.as_ref())?;
        let username = self.account.username();
        let client = if credential.is_oauth() {
            client.auth_xoauth2(username, credential.secret()).await?
        } else {
            client.auth_plain(username, credential.secret()).await?
        };
        self.session = Some(SmtpSession::Authenticated(client));
        info!(account = %self.account.email, "SMTP session open");
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
            Some(SmtpSession::Open(c)) => c.noop().await,
            Some(SmtpSession::Authenticated(c)) => c.noop().await,
            None => return Err(not_connected()),
        };
        self.check(result)
    }

    /// Sends QUIT and drops the session. Errors are only logged.
    pub async fn disconnect(&mut self) {
        let result = match self.session.take() {
            Some(SmtpSession::Open(c)) => c.quit().await,
            Some(SmtpSession::Authenticated(c)) => c.quit().await,
            None => return,
        };
        if let Err(e) = result {
            debug!(account = %self.account.email, error = %e, "QUIT failed");
        }
        info!(account = %self.account.email, "SMTP session closed");
    }

    /// Builds and sends `message`.
    ///
    /// Recipients the server refuses are listed in the report; the send
    /// still succeeds as long as one recipient was accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::AllRecipientsRejected`] if every recipient was refused
    /// - [`Error::MessageRejected`] if the server refused the content
    /// - [`Error::Protocol`] for unparseable addresses or no recipients
    pub async fn send(&mut self, message: &OutgoingMessage) -> Result<SendReport> {
        let payload = self.compose(message)?;
        let from = Address::new(self.account.email.trim())?;
        let recipients = envelope(message)?;
        if recipients.is_empty() {
            return Err(Error::Protocol("message has no recipients".into()));
        }

        let result = match self.session.as_mut() {
            Some(SmtpSession::Open(c)) => c.send_mail(&from, &recipients, payload.as_bytes()).await,
            Some(SmtpSession::Authenticated(c)) => {
                c.send_mail(&from, &recipients, payload.as_bytes()).await
            }
            None => return Err(not_connected()),
        };
        let delivery = self.check(result)?;

        let report = SendReport {
            accepted: delivery
                .accepted
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
            rejected: delivery
                .rejected
                .into_iter()
                .map(RejectedRecipient::from)
                .collect(),
            response: delivery.response,
        };
        if report.is_partial() {
            warn!(
                account = %self.account.email,
                rejected = report.rejected.len(),
                "some recipients were refused"
            );
        }
        info!(account = %self.account.email, accepted = report.accepted.len(), "message sent");
        Ok(report)
    }

    /// Sends a short message to the account's own address.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_test_message(&mut self) -> Result<SendReport> {
        let message = OutgoingMessage::new(
            "WabiMail test message",
            format!(
                "This message confirms that {} can send mail.",
                self.account.email
            ),
        )
        .with_to(self.account.email.clone());
        self.send(&message).await
    }

    /// Renders `message` as it will be transmitted, signature and
    /// headers included. Bcc recipients do not appear.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if an address cannot be parsed or a
    /// header contains a line break.
    pub fn compose(&self, message: &OutgoingMessage) -> Result<String> {
        let from = Mailbox::new(self.account.email.trim())?.with_name(&self.account.display_name);
        let mut builder = MessageBuilder::new()
            .from(from)
            .subject(&message.subject)
            .header("X-Priority", message.priority.header_value())
            .header("X-Mailer", MAILER);

        for to in &message.to {
            builder = builder.to(Mailbox::parse(to)?);
        }
        for cc in &message.cc {
            builder = builder.cc(Mailbox::parse(cc)?);
        }
        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(Mailbox::parse(reply_to)?);
        }
        if let Some(id) = &message.in_reply_to {
            builder = builder
                .in_reply_to(id)
                .references(message.references.clone());
        }

        let signature = self.account.signature.trim_end();
        if signature.is_empty() {
            builder = builder.text_body(&message.text);
            if let Some(html) = &message.html {
                builder = builder.html_body(html);
            }
        } else {
            builder = builder.text_body(format!("{}{SIGNATURE_SEPARATOR}{signature}", message.text));
            if let Some(html) = &message.html {
                builder = builder.html_body(format!("{html}<pre>{}</pre>", escape_html(signature)));
            }
        }

        for attachment in &message.attachments {
            builder = builder.attach(attachment.clone());
        }
        Ok(builder.build()?)
    }

    fn needs_auth(&self) -> bool {
        self.account.settings.requires_auth && self.account.auth_type != AuthType::None
    }

    fn check<T>(&mut self, result: wabimail_smtp::Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.is_connection() {
                warn!(account = %self.account.email, error = %e, "SMTP connection lost");
                self.session = None;
            }
            e.into()
        })
    }
}

/// Envelope recipients: To, Cc and Bcc, bare addresses.
fn envelope(message: &OutgoingMessage) -> Result<Vec<Address>> {
    message
        .recipients()
        .map(|r| -> Result<Address> {
            let mailbox = Mailbox::parse(r)?;
            Ok(Address::new(mailbox.email)?)
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn not_connected() -> Error {
    Error::Connection("not connected".into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::sync::Mutex;

    use super::*;
    use crate::account::AccountType;
    use crate::service::Priority;

    const EHLO_REPLY: &[u8] = b"250-smtp.example.com\r\n250-SIZE 100000\r\n250 AUTH PLAIN XOAUTH2\r\n";

    fn account() -> Account {
        let mut account = Account::new("Work", "me@example.com", AccountType::Smtp)
            .with_signature("Taro Yamada\n<Example Inc.>")
            .with_display_name("Taro Yamada");
        account.settings.outgoing_server = "smtp.example.com".into();
        account
    }

    /// Minimal submission server: refuses recipients starting with
    /// "ghost" and records the DATA payload.
    fn server(stream: DuplexStream, data: Arc<Mutex<String>>) {
        tokio::spawn(async move {
            let (reader, mut writer) = tokio::io::split(stream);
            let mut lines = BufReader::new(reader).lines();
            writer.write_all(b"220 ready\r\n").await.unwrap();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply: &[u8] = if line.starts_with("EHLO") {
                    EHLO_REPLY
                } else if line.starts_with("AUTH") {
                    b"235 2.7.0 Accepted\r\n"
                } else if line.starts_with("RCPT TO:<ghost") {
                    b"550 5.1.1 No such user\r\n"
                } else if line.starts_with("MAIL") || line.starts_with("RCPT") || line == "NOOP" {
                    b"250 OK\r\n"
                } else if line == "DATA" {
                    writer.write_all(b"354 Go ahead\r\n").await.unwrap();
                    let mut body = data.lock().await;
                    while let Ok(Some(line)) = lines.next_line().await {
                        if line == "." {
                            break;
                        }
                        body.push_str(&line);
                        body.push('\n');
                    }
                    b"250 2.0.0 queued as 42\r\n"
                } else if line == "QUIT" {
                    writer.write_all(b"221 Bye\r\n").await.unwrap();
                    break;
                } else {
                    b"500 unknown\r\n"
                };
                writer.write_all(reply).await.unwrap();
            }
        });
    }

    async fn connected(account: Account) -> (SmtpAdapter<DuplexStream>, Arc<Mutex<String>>) {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let data = Arc::new(Mutex::new(String::new()));
        server(server_end, Arc::clone(&data));

        let client = Client::from_stream(client_end)
            .await
            .unwrap()
            .ehlo("client.local")
            .await
            .unwrap();
        let mut adapter = SmtpAdapter::new(account, Some(Credential::Password("pw".into())));
        adapter.start(client).await.unwrap();
        (adapter, data)
    }

    #[tokio::test]
    async fn test_partial_rejection_is_reported() {
        let (mut adapter, data) = connected(account()).await;
        let message = OutgoingMessage::new("Hello", "Body text")
            .with_to("a@example.org")
            .with_cc("ghost@example.org")
            .with_bcc("hidden@example.org");

        let report = adapter.send(&message).await.unwrap();
        assert!(report.is_partial());
        assert_eq!(report.accepted, ["a@example.org", "hidden@example.org"]);
        assert_eq!(report.rejected[0].address, "ghost@example.org");
        assert_eq!(report.rejected[0].code, 550);
        assert!(report.response.contains("queued as 42"));

        let payload = data.lock().await.clone();
        assert!(!payload.contains("hidden@example.org"));
        assert!(payload.contains("X-Mailer: WabiMail"));
        adapter.disconnect().await;
    }

    #[tokio::test]
    async fn test_all_rejected() {
        let (mut adapter, _) = connected(account()).await;
        let message = OutgoingMessage::new("Hello", "Body").with_to("ghost@example.org");

        let err = adapter.send(&message).await.unwrap_err();
        let Error::AllRecipientsRejected(rejected) = err else {
            panic!("expected AllRecipientsRejected, got {err:?}");
        };
        assert_eq!(rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_noop_and_not_connected() {
        let (mut adapter, _) = connected(account()).await;
        adapter.test_connection().await.unwrap();
        adapter.disconnect().await;
        assert!(matches!(
            adapter.test_connection().await.unwrap_err(),
            Error::Connection(_)
        ));
    }

    #[test]
    fn test_compose_headers_and_signature() {
        let adapter = SmtpAdapter::<DuplexStream>::new(account(), None);
        let message = OutgoingMessage::new("Report", "See attached.")
            .with_to("Hanako <hanako@example.org>")
            .with_bcc("secret@example.org")
            .with_html("<p>See attached.</p>")
            .with_reply_to("replies@example.com")
            .with_in_reply_to("<orig@example.org>", vec!["<orig@example.org>".into()])
            .with_priority(Priority::High);

        let raw = adapter.compose(&message).unwrap();
        assert!(raw.contains("Taro Yamada"));
        assert!(raw.contains("X-Priority: 1 (Highest)"));
        assert!(raw.contains("Reply-To: replies@example.com"));
        assert!(raw.contains("In-Reply-To: <orig@example.org>"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("-- "));
        assert!(raw.contains("&lt;Example Inc.&gt;"));
        assert!(!raw.contains("secret@example.org"));
    }

    #[test]
    fn test_no_signature_leaves_body_alone() {
        let mut account = account();
        account.signature = String::new();
        let adapter = SmtpAdapter::<DuplexStream>::new(account, None);
        let raw = adapter
            .compose(&OutgoingMessage::new("Hi", "plain").with_to("a@example.org"))
            .unwrap();
        assert!(!raw.contains("-- "));
        assert!(raw.contains("text/plain"));
    }

    #[tokio::test]
    async fn test_skips_auth_when_not_required() {
        let mut account = account();
        account.settings.requires_auth = false;
        let (client_end, server_end) = tokio::io::duplex(4096);
        server(server_end, Arc::new(Mutex::new(String::new())));
        let client = Client::from_stream(client_end)
            .await
            .unwrap()
            .ehlo("client.local")
            .await
            .unwrap();

        let mut adapter = SmtpAdapter::new(account, None);
        adapter.start(client).await.unwrap();
        assert!(adapter.is_connected());
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_host() {
        let mut account = account();
        account.settings.outgoing_server = String::new();
        let mut adapter = SmtpAdapter::<SmtpStream>::new(account, None);
        assert!(matches!(
            adapter.connect().await.unwrap_err(),
            Error::InvalidSettings(_)
        ));
    }
}
