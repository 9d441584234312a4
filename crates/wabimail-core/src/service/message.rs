//! Messages, folders and send reports shared by the protocol adapters.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use wabimail_imap::{Flag, FolderAttribute};
use wabimail_mime::{Attachment, AttachmentInfo};

use crate::{Error, Result};

/// Where a message lives on its server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum MessageId {
    /// IMAP: folder plus UID.
    Imap {
        /// Folder holding the message.
        folder: String,
        /// UID within the folder.
        uid: u32,
    },
    /// POP3: the UIDL string, stable across sessions.
    Pop3 {
        /// Unique id from UIDL.
        uid: String,
    },
}

impl MessageId {
    /// IMAP message id.
    #[must_use]
    pub fn imap(folder: impl Into<String>, uid: u32) -> Self {
        Self::Imap {
            folder: folder.into(),
            uid,
        }
    }

    /// POP3 message id.
    #[must_use]
    pub fn pop3(uid: impl Into<String>) -> Self {
        Self::Pop3 { uid: uid.into() }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imap { folder, uid } => write!(f, "{folder}/{uid}"),
            Self::Pop3 { uid } => f.write_str(uid),
        }
    }
}

/// Message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum MessageFlag {
    /// Read.
    Seen,
    /// Replied to.
    Answered,
    /// Starred.
    Flagged,
    /// Marked for removal.
    Deleted,
    /// Draft.
    Draft,
    /// New since the last session.
    Recent,
    /// Server keyword.
    Keyword(String),
}

impl From<Flag> for MessageFlag {
    fn from(flag: Flag) -> Self {
        match flag {
            Flag::Seen => Self::Seen,
            Flag::Answered => Self::Answered,
            Flag::Flagged => Self::Flagged,
            Flag::Deleted => Self::Deleted,
            Flag::Draft => Self::Draft,
            Flag::Recent => Self::Recent,
            Flag::Keyword(word) => Self::Keyword(word),
        }
    }
}

impl From<&MessageFlag> for Flag {
    fn from(flag: &MessageFlag) -> Self {
        match flag {
            MessageFlag::Seen => Self::Seen,
            MessageFlag::Answered => Self::Answered,
            MessageFlag::Flagged => Self::Flagged,
            MessageFlag::Deleted => Self::Deleted,
            MessageFlag::Draft => Self::Draft,
            MessageFlag::Recent => Self::Recent,
            MessageFlag::Keyword(word) => Self::Keyword(word.clone()),
        }
    }
}

/// How `set_flags` combines the given flags with the current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagAction {
    /// Add to the current flags.
    Add,
    /// Remove from the current flags.
    Remove,
    /// Replace the current flags.
    Replace,
}

/// A fetched and parsed message.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Server location.
    pub id: MessageId,
    /// Decoded subject.
    pub subject: String,
    /// From header, formatted.
    pub from: String,
    /// To recipients, formatted.
    pub to: Vec<String>,
    /// Cc recipients, formatted.
    pub cc: Vec<String>,
    /// Date header.
    pub date: Option<DateTime<FixedOffset>>,
    /// Message-ID header.
    pub message_id: Option<String>,
    /// Plain text body.
    pub text_body: Option<String>,
    /// HTML body.
    pub html_body: Option<String>,
    /// Attachment metadata.
    #[serde(skip)]
    pub attachments: Vec<AttachmentInfo>,
    /// Flags (always empty for POP3).
    pub flags: Vec<MessageFlag>,
    /// Size in bytes as reported by the server, or the raw length.
    pub size: usize,
}

impl Message {
    /// Parses raw RFC 5322 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the bytes are not a parseable
    /// message.
    pub fn from_raw(
        id: MessageId,
        raw: &[u8],
        flags: Vec<MessageFlag>,
        size: Option<usize>,
    ) -> Result<Self> {
        let parsed = wabimail_mime::Message::parse(raw)
            .map_err(|e| Error::Protocol(format!("message {id}: {e}")))?;
        Ok(Self {
            subject: parsed.subject().unwrap_or_default(),
            from: parsed.from().map(|m| m.to_string()).unwrap_or_default(),
            to: parsed.to().iter().map(ToString::to_string).collect(),
            cc: parsed.cc().iter().map(ToString::to_string).collect(),
            date: parsed.date(),
            message_id: parsed
                .message_id()
                .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string()),
            text_body: parsed.text_body(),
            html_body: parsed.html_body(),
            attachments: parsed.attachments(),
            flags,
            size: size.unwrap_or(raw.len()),
            id,
        })
    }

    /// True when the message has no `\Seen` flag.
    #[must_use]
    pub fn is_unread(&self) -> bool {
        !self.flags.contains(&MessageFlag::Seen)
    }

    /// True when at least one non-inline attachment is present.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        self.attachments.iter().any(|a| !a.is_inline)
    }
}

/// A message that could not be fetched or parsed.
#[derive(Debug)]
pub struct FetchFailure {
    /// Which message.
    pub id: MessageId,
    /// Why.
    pub error: Error,
}

/// Result of a fetch: the messages that parsed plus per-item failures.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Parsed messages, newest first.
    pub messages: Vec<Message>,
    /// Messages that failed.
    pub failures: Vec<FetchFailure>,
}

impl FetchBatch {
    /// Records a raw message, turning a parse error into a failure.
    pub(crate) fn push_raw(
        &mut self,
        id: MessageId,
        raw: &[u8],
        flags: Vec<MessageFlag>,
        size: Option<usize>,
    ) {
        match Message::from_raw(id.clone(), raw, flags, size) {
            Ok(message) => self.messages.push(message),
            Err(error) => self.push_failure(id, error),
        }
    }

    pub(crate) fn push_failure(&mut self, id: MessageId, error: Error) {
        tracing::warn!(message = %id, error = %error, "skipping message");
        self.failures.push(FetchFailure { id, error });
    }

    /// Number of messages plus failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len() + self.failures.len()
    }

    /// True when nothing was fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Role of a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    /// Inbox.
    Inbox,
    /// Sent mail.
    Sent,
    /// Drafts.
    Drafts,
    /// Trash.
    Trash,
    /// Spam/junk.
    Spam,
    /// Archive.
    Archive,
    /// Anything else.
    Regular,
}

impl FolderKind {
    /// Guesses the role from a folder name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        let leaf = lower.rsplit(['/', '.']).next().unwrap_or(&lower);
        if lower == "inbox" {
            Self::Inbox
        } else if leaf.contains("sent") {
            Self::Sent
        } else if leaf.contains("draft") {
            Self::Drafts
        } else if leaf.contains("trash") || leaf.contains("deleted") {
            Self::Trash
        } else if leaf.contains("spam") || leaf.contains("junk") {
            Self::Spam
        } else if leaf.contains("archive") {
            Self::Archive
        } else {
            Self::Regular
        }
    }

    /// Role from a special-use attribute, falling back to the name.
    #[must_use]
    pub fn detect(name: &str, attributes: &[FolderAttribute]) -> Self {
        let by_attribute = attributes.iter().find_map(|a| match a {
            FolderAttribute::Sent => Some(Self::Sent),
            FolderAttribute::Drafts => Some(Self::Drafts),
            FolderAttribute::Trash => Some(Self::Trash),
            FolderAttribute::Junk => Some(Self::Spam),
            FolderAttribute::Archive => Some(Self::Archive),
            _ => None,
        });
        by_attribute.unwrap_or_else(|| Self::from_name(name))
    }
}

/// A folder on an IMAP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    /// Full decoded name.
    pub name: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Detected role.
    pub kind: FolderKind,
    /// False for `\Noselect` containers.
    pub selectable: bool,
    /// Whether the server reports child folders.
    pub has_children: bool,
}

impl From<wabimail_imap::Folder> for Folder {
    fn from(folder: wabimail_imap::Folder) -> Self {
        Self {
            kind: FolderKind::detect(&folder.name, &folder.attributes),
            selectable: folder.is_selectable(),
            has_children: folder.attributes.contains(&FolderAttribute::HasChildren),
            delimiter: folder.delimiter,
            name: folder.name,
        }
    }
}

/// `X-Priority` of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// `1 (Highest)`
    High,
    /// `3 (Normal)`
    #[default]
    Normal,
    /// `5 (Lowest)`
    Low,
}

impl Priority {
    /// Header value.
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::High => "1 (Highest)",
            Self::Normal => "3 (Normal)",
            Self::Low => "5 (Lowest)",
        }
    }
}

/// A message to send.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    /// To recipients.
    pub to: Vec<String>,
    /// Cc recipients.
    pub cc: Vec<String>,
    /// Bcc recipients; envelope only.
    pub bcc: Vec<String>,
    /// Subject.
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// Optional HTML body.
    pub html: Option<String>,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Reply-To address.
    pub reply_to: Option<String>,
    /// Message-ID this replies to.
    pub in_reply_to: Option<String>,
    /// Thread references.
    pub references: Vec<String>,
    /// Priority header.
    pub priority: Priority,
}

impl OutgoingMessage {
    /// Creates a plain text message.
    #[must_use]
    pub fn new(subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Adds a To recipient.
    #[must_use]
    pub fn with_to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Adds a Cc recipient.
    #[must_use]
    pub fn with_cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Adds a Bcc recipient.
    #[must_use]
    pub fn with_bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Sets the HTML alternative.
    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Sets Reply-To.
    #[must_use]
    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Marks the message as a reply.
    #[must_use]
    pub fn with_in_reply_to(mut self, message_id: impl Into<String>, references: Vec<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self.references = references;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Envelope recipients: to, cc and bcc in that order.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
    }
}

/// A recipient the server refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecipient {
    /// Address.
    pub address: String,
    /// SMTP reply code.
    pub code: u16,
    /// Server text.
    pub message: String,
}

impl From<wabimail_smtp::RejectedRecipient> for RejectedRecipient {
    fn from(r: wabimail_smtp::RejectedRecipient) -> Self {
        Self {
            address: r.address.as_str().to_string(),
            code: r.code,
            message: r.message,
        }
    }
}

/// Outcome of a send the server accepted for at least one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReport {
    /// Recipients the server accepted.
    pub accepted: Vec<String>,
    /// Recipients the server refused.
    pub rejected: Vec<RejectedRecipient>,
    /// Final server reply to the message data.
    pub response: String,
}

impl SendReport {
    /// True when some recipients were refused.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"From: \"Hanako\" <hanako@example.com>\r\n\
To: taro@example.com, jiro@example.com\r\n\
Subject: =?UTF-8?B?5L6/44KK?=\r\n\
Date: Mon, 6 Jan 2025 10:00:00 +0900\r\n\
Message-ID: <abc@example.com>\r\n\
\r\n\
hello\r\n";

    #[test]
    fn test_from_raw() {
        let message = Message::from_raw(
            MessageId::imap("INBOX", 7),
            RAW,
            vec![MessageFlag::Flagged],
            Some(120),
        )
        .unwrap();

        assert_eq!(message.subject, "便り");
        assert!(message.from.contains("hanako@example.com"));
        assert_eq!(message.to.len(), 2);
        assert_eq!(message.message_id.as_deref(), Some("abc@example.com"));
        assert_eq!(message.size, 120);
        assert!(message.is_unread());
        assert!(!message.has_attachments());
        assert!(message.text_body.unwrap().contains("hello"));
    }

    #[test]
    fn test_batch_keeps_going_after_bad_message() {
        let mut batch = FetchBatch::default();
        batch.push_raw(MessageId::pop3("a"), RAW, Vec::new(), None);
        batch.push_failure(MessageId::pop3("b"), Error::Protocol("no body".into()));
        batch.push_raw(MessageId::pop3("c"), RAW, Vec::new(), None);

        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].id, MessageId::pop3("b"));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_flag_conversion() {
        assert_eq!(MessageFlag::from(Flag::Seen), MessageFlag::Seen);
        assert_eq!(
            Flag::from(&MessageFlag::Keyword("$Label1".into())),
            Flag::Keyword("$Label1".into())
        );
    }

    #[test]
    fn test_folder_kind() {
        assert_eq!(FolderKind::from_name("INBOX"), FolderKind::Inbox);
        assert_eq!(FolderKind::from_name("[Gmail]/Sent Mail"), FolderKind::Sent);
        assert_eq!(FolderKind::from_name("Deleted Items"), FolderKind::Trash);
        assert_eq!(FolderKind::from_name("Projects"), FolderKind::Regular);
        assert_eq!(
            FolderKind::detect("Papierkorb", &[FolderAttribute::Trash]),
            FolderKind::Trash
        );
    }

    #[test]
    fn test_folder_from_imap() {
        let folder = Folder::from(wabimail_imap::Folder {
            name: "Work".into(),
            delimiter: Some('/'),
            attributes: vec![FolderAttribute::NoSelect, FolderAttribute::HasChildren],
        });
        assert!(!folder.selectable);
        assert!(folder.has_children);
        assert_eq!(folder.kind, FolderKind::Regular);
    }

    #[test]
    fn test_recipients_include_bcc() {
        let message = OutgoingMessage::new("hi", "body")
            .with_to("a@example.com")
            .with_cc("b@example.com")
            .with_bcc("c@example.com");
        let all: Vec<_> = message.recipients().collect();
        assert_eq!(all, ["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(MessageId::imap("INBOX", 3).to_string(), "INBOX/3");
        assert_eq!(MessageId::pop3("xyz").to_string(), "xyz");
    }
}
