//! Generation of outgoing messages.

use crate::address::Mailbox;
use crate::content_type::ContentType;
use crate::encoding::{encode_base64_lines, encode_quoted_printable, encode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::message::TransferEncoding;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::fmt::Write as _;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name presented to the recipient.
    pub filename: String,
    /// MIME type of the data.
    pub content_type: ContentType,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment, guessing the content type from the file name.
    #[must_use]
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = ContentType::for_filename(&filename);
        Self {
            filename,
            content_type,
            data,
        }
    }

    /// Overrides the guessed content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Builds an RFC 5322 message with MIME structure.
///
/// - text only: `text/plain`
/// - text + HTML: `multipart/alternative`
/// - attachments: `multipart/mixed` wrapping the body
///
/// Bcc recipients are never written to headers; pass them to the
/// transport envelope only.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    reply_to: Option<Mailbox>,
    subject: String,
    date: Option<DateTime<Utc>>,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references: Vec<String>,
    extra_headers: Vec<(String, String)>,
    text: String,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From mailbox.
    #[must_use]
    pub fn from(mut self, mailbox: Mailbox) -> Self {
        self.from = Some(mailbox);
        self
    }

    /// Adds a To recipient.
    #[must_use]
    pub fn to(mut self, mailbox: Mailbox) -> Self {
        self.to.push(mailbox);
        self
    }

    /// Adds a Cc recipient.
    #[must_use]
    pub fn cc(mut self, mailbox: Mailbox) -> Self {
        self.cc.push(mailbox);
        self
    }

    /// Sets Reply-To.
    #[must_use]
    pub fn reply_to(mut self, mailbox: Mailbox) -> Self {
        self.reply_to = Some(mailbox);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the Date; defaults to the build time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the Message-ID (with or without angle brackets).
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets In-Reply-To.
    #[must_use]
    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    /// Sets References.
    #[must_use]
    pub fn references(mut self, ids: Vec<String>) -> Self {
        self.references = ids;
        self
    }

    /// Adds an arbitrary header (e.g. `X-Priority`).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Sets the HTML alternative.
    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Renders the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns an error if From is missing or a header value contains a
    /// line break.
    pub fn build(self) -> Result<String> {
        let from = self.from.as_ref().ok_or(Error::MissingHeader("From"))?;

        let mut headers = Headers::new();
        let date = self.date.unwrap_or_else(Utc::now);
        headers.add("Date", date.to_rfc2822());
        headers.add("From", from.to_string());
        if !self.to.is_empty() {
            headers.add("To", join_mailboxes(&self.to));
        }
        if !self.cc.is_empty() {
            headers.add("Cc", join_mailboxes(&self.cc));
        }
        if let Some(reply_to) = &self.reply_to {
            headers.add("Reply-To", reply_to.to_string());
        }
        headers.add("Subject", encode_rfc2047(&checked("Subject", &self.subject)?));

        let message_id = self.message_id.clone().unwrap_or_else(|| {
            let domain = from.email.rsplit_once('@').map_or("localhost", |(_, d)| d);
            format!("{}@{domain}", random_token())
        });
        headers.add("Message-ID", angle(&checked("Message-ID", &message_id)?));
        if let Some(id) = &self.in_reply_to {
            headers.add("In-Reply-To", angle(&checked("In-Reply-To", id)?));
        }
        if !self.references.is_empty() {
            let refs: Vec<String> = self.references.iter().map(|r| angle(r)).collect();
            headers.add("References", checked("References", &refs.join(" "))?);
        }
        for (name, value) in &self.extra_headers {
            headers.add(name.clone(), encode_rfc2047(&checked(name, value)?));
        }
        headers.add("MIME-Version", "1.0");

        let body = self.body_entity();
        let mut out = String::new();
        let _ = write!(out, "{headers}");
        out.push_str(&body);
        Ok(out)
    }

    /// Renders the body entity, including its own Content-* headers.
    fn body_entity(&self) -> String {
        let text = text_entity(&self.text, ContentType::text_plain());
        let content = match &self.html {
            Some(html) => {
                let html = text_entity(html, ContentType::text_html());
                multipart_entity("alternative", &[text, html])
            }
            None => text,
        };

        if self.attachments.is_empty() {
            return content;
        }

        let mut entities = vec![content];
        entities.extend(self.attachments.iter().map(attachment_entity));
        multipart_entity("mixed", &entities)
    }
}

fn checked(name: &str, value: &str) -> Result<String> {
    if value.contains(['\r', '\n']) {
        return Err(Error::HeaderInjection(name.to_string()));
    }
    Ok(value.to_string())
}

fn angle(id: &str) -> String {
    let id = id.trim();
    if id.starts_with('<') && id.ends_with('>') {
        id.to_string()
    } else {
        format!("<{id}>")
    }
}

fn join_mailboxes(mailboxes: &[Mailbox]) -> String {
    mailboxes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",\r\n ")
}

fn random_token() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(24), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn text_entity(text: &str, content_type: ContentType) -> String {
    let (encoding, body) = if text.is_ascii() && text.lines().all(|l| l.len() <= 998) {
        (TransferEncoding::SevenBit, normalize_newlines(text))
    } else {
        (TransferEncoding::QuotedPrintable, encode_quoted_printable(text))
    };
    format!("Content-Type: {content_type}\r\nContent-Transfer-Encoding: {encoding}\r\n\r\n{body}")
}

fn attachment_entity(attachment: &Attachment) -> String {
    let filename = &attachment.filename;
    let (name_param, disposition_param) = if filename.is_ascii() && !filename.contains('"') {
        (
            format!("name=\"{filename}\""),
            format!("filename=\"{filename}\""),
        )
    } else {
        (
            format!("name=\"{}\"", encode_rfc2047(filename).replace("\r\n ", "")),
            format!("filename*=utf-8''{}", percent_encode(filename)),
        )
    };

    format!(
        "Content-Type: {}; {name_param}\r\nContent-Disposition: attachment; {disposition_param}\r\nContent-Transfer-Encoding: base64\r\n\r\n{}",
        attachment.content_type.essence(),
        encode_base64_lines(&attachment.data)
    )
}

fn multipart_entity(sub_type: &str, entities: &[String]) -> String {
    let boundary = format!("=_wabi_{}", random_token());
    let content_type = ContentType::multipart(sub_type, boundary.clone());
    let mut out = format!("Content-Type: {content_type}\r\n\r\n");
    for entity in entities {
        let _ = write!(out, "--{boundary}\r\n{entity}\r\n");
    }
    let _ = write!(out, "--{boundary}--\r\n");
    out
}

fn normalize_newlines(text: &str) -> String {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn percent_encode(s: &str) -> String {
    s.bytes().fold(String::new(), |mut out, b| {
        if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
        out
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn base() -> MessageBuilder {
        MessageBuilder::new()
            .from(Mailbox::new("sender@example.com").unwrap().with_name("Sender"))
            .to(Mailbox::new("to@example.com").unwrap())
            .subject("Test")
    }

    #[test]
    fn test_requires_from() {
        let err = MessageBuilder::new().subject("x").build().unwrap_err();
        assert!(matches!(err, Error::MissingHeader("From")));
    }

    #[test]
    fn test_plain_text_message() {
        let raw = base().text_body("Hello\nWorld").build().unwrap();
        assert!(raw.contains("From: Sender <sender@example.com>\r\n"));
        assert!(raw.contains("To: to@example.com\r\n"));
        assert!(raw.contains("MIME-Version: 1.0\r\n"));
        assert!(raw.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(raw.contains("Content-Transfer-Encoding: 7bit\r\n"));
        assert!(raw.ends_with("\r\n\r\nHello\r\nWorld"));

        let parsed = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(parsed.text_body().as_deref(), Some("Hello\r\nWorld"));
        assert!(parsed.message_id().unwrap().ends_with("@example.com>"));
    }

    #[test]
    fn test_alternative_with_html() {
        let raw = base()
            .text_body("plain")
            .html_body("<b>rich</b>")
            .build()
            .unwrap();
        assert!(raw.contains("multipart/alternative"));

        let parsed = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(parsed.text_body().as_deref(), Some("plain"));
        assert_eq!(parsed.html_body().as_deref(), Some("<b>rich</b>"));
        assert!(parsed.attachments().is_empty());
    }

    #[test]
    fn test_mixed_with_attachment() {
        let raw = base()
            .text_body("see attached")
            .html_body("<p>see attached</p>")
            .attach(Attachment::new("data.csv", b"a,b\n1,2\n".to_vec()))
            .attach(Attachment::new("写真.png", vec![0x89, b'P', b'N', b'G']))
            .build()
            .unwrap();
        assert!(raw.contains("multipart/mixed"));

        let parsed = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(parsed.text_body().as_deref(), Some("see attached"));
        let attachments = parsed.attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].filename.as_deref(), Some("data.csv"));
        assert_eq!(attachments[0].content_type, "text/csv");
        assert_eq!(attachments[0].size, 8);
        assert_eq!(attachments[1].filename.as_deref(), Some("写真.png"));
        assert_eq!(attachments[1].size, 4);
    }

    #[test]
    fn test_non_ascii_subject_and_body() {
        let raw = base()
            .subject("こんにちは")
            .text_body("日本語の本文")
            .build()
            .unwrap();
        assert!(raw.contains("Subject: =?utf-8?B?"));
        assert!(raw.contains("Content-Transfer-Encoding: quoted-printable"));

        let parsed = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(parsed.subject().as_deref(), Some("こんにちは"));
        assert_eq!(parsed.text_body().as_deref(), Some("日本語の本文"));
    }

    #[test]
    fn test_threading_headers() {
        let raw = base()
            .in_reply_to("orig@example.com")
            .references(vec!["<a@x>".into(), "b@x".into()])
            .header("X-Priority", "1")
            .message_id("<fixed@example.com>")
            .build()
            .unwrap();
        assert!(raw.contains("In-Reply-To: <orig@example.com>\r\n"));
        assert!(raw.contains("References: <a@x> <b@x>\r\n"));
        assert!(raw.contains("X-Priority: 1\r\n"));
        assert!(raw.contains("Message-ID: <fixed@example.com>\r\n"));
    }

    #[test]
    fn test_header_injection_rejected() {
        let err = base()
            .subject("hi\r\nBcc: victim@example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::HeaderInjection(name) if name == "Subject"));
    }

    #[test]
    fn test_cc_written_no_bcc_concept() {
        let raw = base()
            .cc(Mailbox::new("cc@example.com").unwrap())
            .build()
            .unwrap();
        assert!(raw.contains("Cc: cc@example.com\r\n"));
        assert!(!raw.contains("Bcc"));
    }
}
