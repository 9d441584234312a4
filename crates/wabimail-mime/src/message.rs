//! Parsing of received messages.

use crate::address::Mailbox;
use crate::content_type::{ContentType, split_parameters};
use crate::encoding::{decode_base64, decode_charset, decode_quoted_printable, decode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use chrono::{DateTime, FixedOffset};
use std::fmt;

/// Nesting limit for multipart bodies.
const MAX_DEPTH: usize = 16;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value; unknown values are 7bit.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Decodes a body in this encoding. Undecodable base64 yields the raw bytes.
    #[must_use]
    pub fn decode(self, body: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => decode_base64(body).unwrap_or_else(|_| body.to_vec()),
            Self::QuotedPrintable => decode_quoted_printable(body),
            Self::SevenBit | Self::EightBit | Self::Binary => body.to_vec(),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Binary => "binary",
        })
    }
}

/// One node of a MIME tree.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Raw (still transfer-encoded) body of a leaf part.
    pub body: Vec<u8>,
    /// Children of a multipart part.
    pub children: Vec<Part>,
}

impl Part {
    fn parse(raw: &[u8], depth: usize) -> Result<Self> {
        let (head, body) = split_head_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head));
        let mut part = Self {
            headers,
            body: body.to_vec(),
            children: Vec::new(),
        };

        let content_type = part.content_type();
        if content_type.is_multipart() && depth < MAX_DEPTH {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            for chunk in split_multipart(body, boundary) {
                part.children.push(Self::parse(chunk, depth + 1)?);
            }
            part.body.clear();
        }

        Ok(part)
    }

    /// Gets the content type, defaulting to `text/plain` when absent or invalid.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|v| ContentType::parse(v).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes the body according to the transfer encoding.
    #[must_use]
    pub fn decoded_body(&self) -> Vec<u8> {
        self.transfer_encoding().decode(&self.body)
    }

    /// Decodes the body to text using the declared charset.
    #[must_use]
    pub fn body_text(&self) -> String {
        let content_type = self.content_type();
        decode_charset(&self.decoded_body(), content_type.charset().unwrap_or("utf-8"))
    }

    /// Returns the attachment file name from Content-Disposition or the
    /// Content-Type `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let disposition = self.headers.get("content-disposition").unwrap_or_default();
        disposition_parameter(disposition, "filename")
            .or_else(|| self.content_type().name().map(str::to_string))
            .map(|name| decode_rfc2047(&name))
    }

    fn is_attachment(&self) -> bool {
        let disposition = self
            .headers
            .get("content-disposition")
            .unwrap_or_default()
            .trim_start()
            .to_ascii_lowercase();
        if disposition.starts_with("attachment") {
            return true;
        }
        let content_type = self.content_type();
        !content_type.is_multipart() && content_type.main_type != "text" && self.filename().is_some()
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Self)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Metadata of an attachment found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    /// File name, if the sender provided one.
    pub filename: Option<String>,
    /// `type/subtype`.
    pub content_type: String,
    /// Decoded size in bytes.
    pub size: usize,
    /// Content-ID for inline parts.
    pub content_id: Option<String>,
    /// True for `Content-Disposition: inline`.
    pub is_inline: bool,
}

/// A parsed message.
#[derive(Debug, Clone)]
pub struct Message {
    root: Part,
    size: usize,
}

impl Message {
    /// Parses a full RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no header block or a multipart part
    /// lacks its boundary.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let root = Part::parse(raw, 0)?;
        if root.headers.is_empty() {
            return Err(Error::Malformed("no header fields".into()));
        }
        Ok(Self {
            root,
            size: raw.len(),
        })
    }

    /// Returns the top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Returns the root part of the MIME tree.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Size of the raw message in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Decoded Subject.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.root.headers.get_decoded("subject")
    }

    /// Parsed From mailbox.
    #[must_use]
    pub fn from(&self) -> Option<Mailbox> {
        self.root
            .headers
            .get("from")
            .and_then(|v| Mailbox::parse_list(v).into_iter().next())
    }

    /// Parsed To mailboxes.
    #[must_use]
    pub fn to(&self) -> Vec<Mailbox> {
        self.address_list("to")
    }

    /// Parsed Cc mailboxes.
    #[must_use]
    pub fn cc(&self) -> Vec<Mailbox> {
        self.address_list("cc")
    }

    fn address_list(&self, name: &str) -> Vec<Mailbox> {
        self.root
            .headers
            .get_all(name)
            .into_iter()
            .flat_map(Mailbox::parse_list)
            .collect()
    }

    /// Parsed Date header.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.root.headers.get("date")?;
        // Strip a trailing comment such as "(UTC)".
        let value = raw.split_once('(').map_or(raw, |(v, _)| v).trim();
        DateTime::parse_from_rfc2822(value).ok()
    }

    /// Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.root.headers.get("message-id")
    }

    /// First `text/plain` body that is not an attachment.
    #[must_use]
    pub fn text_body(&self) -> Option<String> {
        self.first_text("plain")
    }

    /// First `text/html` body that is not an attachment.
    #[must_use]
    pub fn html_body(&self) -> Option<String> {
        self.first_text("html")
    }

    fn first_text(&self, sub: &str) -> Option<String> {
        let mut found = None;
        self.root.walk(&mut |part| {
            if found.is_none()
                && part.children.is_empty()
                && part.content_type().is_text(sub)
                && !part.is_attachment()
            {
                found = Some(part.body_text());
            }
        });
        found
    }

    /// Attachments anywhere in the MIME tree.
    #[must_use]
    pub fn attachments(&self) -> Vec<AttachmentInfo> {
        let mut attachments = Vec::new();
        self.root.walk(&mut |part| {
            if part.children.is_empty() && part.is_attachment() {
                let is_inline = part
                    .headers
                    .get("content-disposition")
                    .is_some_and(|d| d.trim_start().to_ascii_lowercase().starts_with("inline"));
                attachments.push(AttachmentInfo {
                    filename: part.filename(),
                    content_type: part.content_type().essence(),
                    size: part.decoded_body().len(),
                    content_id: part
                        .headers
                        .get("content-id")
                        .map(|id| id.trim_matches(['<', '>']).to_string()),
                    is_inline,
                });
            }
        });
        attachments
    }
}

fn disposition_parameter(value: &str, name: &str) -> Option<String> {
    split_parameters(value).into_iter().skip(1).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        let val = val.trim().trim_matches('"');
        if key == name {
            Some(val.to_string())
        } else if key == format!("{name}*") {
            // RFC 2231: charset'lang'percent-encoded
            let mut pieces = val.splitn(3, '\'');
            let charset = pieces.next().unwrap_or("utf-8");
            let encoded = pieces.nth(1).unwrap_or(val);
            Some(decode_charset(&percent_decode(encoded), charset))
        } else {
            None
        }
    })
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Splits at the first empty line; a message with no empty line is all header.
fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if raw.starts_with(b"\r\n") {
        return (&[], &raw[2..]);
    }
    if raw.starts_with(b"\n") {
        return (&[], &raw[1..]);
    }
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        return (&raw[..pos], &raw[pos + 4..]);
    }
    if let Some(pos) = find(raw, b"\n\n") {
        return (&raw[..pos], &raw[pos + 2..]);
    }
    (raw, &[])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits a multipart body into its parts. The line break before each
/// delimiter belongs to the delimiter.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut line_start = 0;

    while line_start < body.len() {
        let line_end = body[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |p| line_start + p);
        let next = (line_end + 1).min(body.len());
        let line = body[line_start..line_end].trim_ascii_end();

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(start) = part_start {
                    let mut end = line_start.max(start);
                    if end > start && body[end - 1] == b'\n' {
                        end -= 1;
                    }
                    if end > start && body[end - 1] == b'\r' {
                        end -= 1;
                    }
                    parts.push(&body[start..end]);
                }
                if closing {
                    return parts;
                }
                part_start = Some(next);
            }
        }
        line_start = next;
    }

    // Unterminated multipart: keep the last part.
    if let Some(start) = part_start {
        parts.push(&body[start..]);
    }
    parts
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

    const SIMPLE: &[u8] = b"From: \"Sender\" <sender@example.com>\r\n\
To: a@example.com, \"B, Bee\" <b@example.com>\r\n\
Subject: =?utf-8?B?SMOpbGxv?=\r\n\
Date: Tue, 1 Jul 2025 10:52:37 +0900 (JST)\r\n\
Message-ID: <abc@example.com>\r\n\
\r\n\
Hello, World!\r\n";

    const MULTIPART: &[u8] = b"From: sender@example.com\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
preamble\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=E9\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>caf\xc3\xa9</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
SGVsbG8s\r\n\
IFdvcmxkIQ==\r\n\
--outer--\r\n\
epilogue\r\n";

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-unknown"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_simple_message() {
        let message = Message::parse(SIMPLE).unwrap();
        assert_eq!(message.subject().as_deref(), Some("Héllo"));
        let from = message.from().unwrap();
        assert_eq!(from.name.as_deref(), Some("Sender"));
        assert_eq!(from.email, "sender@example.com");
        assert_eq!(message.to().len(), 2);
        assert_eq!(message.to()[1].name.as_deref(), Some("B, Bee"));
        assert_eq!(message.text_body().as_deref(), Some("Hello, World!\r\n"));
        assert!(message.html_body().is_none());
        assert_eq!(message.message_id(), Some("<abc@example.com>"));
        assert_eq!(message.size(), SIMPLE.len());

        let date = message.date().unwrap();
        assert_eq!(date.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_nested_multipart() {
        let message = Message::parse(MULTIPART).unwrap();
        assert_eq!(message.root().children.len(), 2);
        assert_eq!(message.text_body().as_deref(), Some("café"));
        assert_eq!(message.html_body().as_deref(), Some("<p>café</p>"));

        let attachments = message.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename.as_deref(), Some("report.pdf"));
        assert_eq!(attachments[0].content_type, "application/pdf");
        assert_eq!(attachments[0].size, "Hello, World!".len());
        assert!(!attachments[0].is_inline);
    }

    #[test]
    fn test_rfc2231_filename() {
        let raw = b"From: a@example.com\r\n\
Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename*=utf-8''%E8%AB%8B%E6%B1%82.txt\r\n\
\r\n\
data\r\n\
--b--\r\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(
            message.attachments()[0].filename.as_deref(),
            Some("請求.txt")
        );
    }

    #[test]
    fn test_missing_boundary() {
        let raw = b"From: a@example.com\r\nContent-Type: multipart/mixed\r\n\r\nbody";
        assert!(matches!(Message::parse(raw), Err(Error::MissingBoundary)));
    }

    #[test]
    fn test_no_headers_is_malformed() {
        assert!(matches!(
            Message::parse(b"\r\njust a body"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_lf_only_message() {
        let raw = b"Subject: lf\nFrom: a@example.com\n\nline one\nline two\n";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.subject().as_deref(), Some("lf"));
        assert_eq!(message.text_body().as_deref(), Some("line one\nline two\n"));
    }

    #[test]
    fn test_unterminated_multipart_keeps_last_part() {
        let raw = b"From: a@example.com\r\nContent-Type: multipart/mixed; boundary=x\r\n\r\n--x\r\n\r\ntail";
        let message = Message::parse(raw).unwrap();
        assert_eq!(message.root().children.len(), 1);
        assert_eq!(message.text_body().as_deref(), Some("tail"));
    }
}
