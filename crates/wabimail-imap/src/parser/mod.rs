//! Response parsing.
//!
//! Operates on one complete response as returned by
//! [`FramedStream::read_response`](crate::FramedStream::read_response),
//! with any literals already inlined.

mod value;

pub use value::Value;

use value::Cursor;

use crate::types::{FetchedMessage, Flag, Folder, FolderAttribute, StatusInfo};
use crate::{Result, utf7};

/// Completion status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `OK`
    Ok,
    /// `NO`
    No,
    /// `BAD`
    Bad,
    /// `PREAUTH`
    PreAuth,
    /// `BYE`
    Bye,
}

impl Status {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// Bracketed response code, e.g. `[UIDVALIDITY 3857529045]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// Capabilities sent with the greeting or after login.
    Capability(Vec<String>),
    /// `UIDVALIDITY`
    UidValidity(u32),
    /// `UIDNEXT`
    UidNext(u32),
    /// `UNSEEN` (first unseen sequence number).
    Unseen(u32),
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `AUTHENTICATIONFAILED` (RFC 5530).
    AuthenticationFailed,
    /// Anything else, verbatim.
    Other(String),
}

/// A parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `+ text`
    Continuation(String),
    /// Completion of a command.
    Tagged {
        /// Command tag.
        tag: String,
        /// Completion status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human readable text.
        text: String,
    },
    /// `* ...` data.
    Untagged(Untagged),
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Untagged {
    /// `* OK|NO|BAD|PREAUTH|BYE [code] text`
    Status {
        /// Status keyword.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<String>),
    /// `* LIST` / `* LSUB`
    List(Folder),
    /// `* SEARCH n ...`
    Search(Vec<u32>),
    /// `* FLAGS (...)`
    Flags(Vec<Flag>),
    /// `* STATUS mailbox (...)`
    MailboxStatus {
        /// Decoded mailbox name.
        mailbox: String,
        /// Reported counters.
        info: StatusInfo,
    },
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(u32),
    /// `* n FETCH (...)`
    Fetch(FetchedMessage),
    /// Anything this client does not interpret.
    Other(String),
}

/// Parses one response.
///
/// # Errors
///
/// Returns [`Error::Parse`](crate::Error::Parse) if the response is not
/// well formed.
pub fn parse(input: &[u8]) -> Result<Response> {
    let mut cur = Cursor::new(input);

    if cur.eat(b'+') {
        cur.eat(b' ');
        return Ok(Response::Continuation(cur.rest_text()));
    }

    let tag = cur.atom()?;
    cur.expect(b' ')?;

    if tag == "*" {
        return parse_untagged(&mut cur).map(Response::Untagged);
    }

    let keyword = cur.atom()?;
    let status =
        Status::parse(&keyword).ok_or_else(|| cur.error(&format!("unknown status {keyword}")))?;
    let (code, text) = parse_resp_text(&mut cur)?;
    Ok(Response::Tagged {
        tag,
        status,
        code,
        text,
    })
}

fn parse_untagged(cur: &mut Cursor<'_>) -> Result<Untagged> {
    let first = cur.atom()?;

    if let Ok(number) = first.parse::<u32>() {
        cur.expect(b' ')?;
        let keyword = cur.atom()?.to_ascii_uppercase();
        return match keyword.as_str() {
            "EXISTS" => Ok(Untagged::Exists(number)),
            "RECENT" => Ok(Untagged::Recent(number)),
            "EXPUNGE" => Ok(Untagged::Expunge(number)),
            "FETCH" => {
                cur.expect(b' ')?;
                parse_fetch(cur, number).map(Untagged::Fetch)
            }
            _ => Ok(Untagged::Other(format!("{number} {keyword}"))),
        };
    }

    if let Some(status) = Status::parse(&first) {
        let (code, text) = parse_resp_text(cur)?;
        return Ok(Untagged::Status { status, code, text });
    }

    match first.to_ascii_uppercase().as_str() {
        "CAPABILITY" => Ok(Untagged::Capability(
            cur.rest_text().split_whitespace().map(str::to_string).collect(),
        )),
        "LIST" | "LSUB" => {
            cur.expect(b' ')?;
            parse_list(cur).map(Untagged::List)
        }
        "SEARCH" => cur
            .rest_text()
            .split_whitespace()
            .map(|n| n.parse::<u32>().map_err(|_| cur.error("invalid SEARCH number")))
            .collect::<Result<Vec<_>>>()
            .map(Untagged::Search),
        "FLAGS" => {
            cur.expect(b' ')?;
            Ok(Untagged::Flags(flags_from(&cur.value()?)))
        }
        "STATUS" => {
            cur.expect(b' ')?;
            parse_status(cur)
        }
        other => Ok(Untagged::Other(format!("{other} {}", cur.rest_text()))),
    }
}

fn parse_resp_text(cur: &mut Cursor<'_>) -> Result<(Option<ResponseCode>, String)> {
    cur.eat(b' ');
    let code = if cur.eat(b'[') {
        let inner = cur.take_until(b']')?;
        Some(parse_code(&inner))
    } else {
        None
    };
    cur.eat(b' ');
    Ok((code, cur.rest_text()))
}

fn parse_code(inner: &str) -> ResponseCode {
    let (name, arg) = inner.split_once(' ').unwrap_or((inner, ""));
    let numeric = |make: fn(u32) -> ResponseCode| {
        arg.trim()
            .parse::<u32>()
            .map_or_else(|_| ResponseCode::Other(inner.to_string()), make)
    };
    match name.to_ascii_uppercase().as_str() {
        "CAPABILITY" => {
            ResponseCode::Capability(arg.split_whitespace().map(str::to_string).collect())
        }
        "UIDVALIDITY" => numeric(ResponseCode::UidValidity),
        "UIDNEXT" => numeric(ResponseCode::UidNext),
        "UNSEEN" => numeric(ResponseCode::Unseen),
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        _ => ResponseCode::Other(inner.to_string()),
    }
}

fn parse_list(cur: &mut Cursor<'_>) -> Result<Folder> {
    let attributes = match cur.value()? {
        Value::List(items) => items
            .iter()
            .filter_map(Value::as_text)
            .map(|a| FolderAttribute::parse(&a))
            .collect(),
        _ => return Err(cur.error("expected attribute list")),
    };
    cur.expect(b' ')?;
    let delimiter = cur.value()?.as_text().and_then(|d| d.chars().next());
    cur.expect(b' ')?;
    let raw = cur
        .value()?
        .as_text()
        .ok_or_else(|| cur.error("expected mailbox name"))?;
    let name = utf7::decode(&raw).unwrap_or(raw);

    Ok(Folder {
        name,
        delimiter,
        attributes,
    })
}

fn parse_status(cur: &mut Cursor<'_>) -> Result<Untagged> {
    let raw = cur
        .value()?
        .as_text()
        .ok_or_else(|| cur.error("expected mailbox name"))?;
    cur.expect(b' ')?;
    let Value::List(items) = cur.value()? else {
        return Err(cur.error("expected status list"));
    };

    let mut info = StatusInfo::default();
    for pair in items.chunks(2) {
        let [key, value] = pair else { break };
        let (Some(key), Some(value)) = (key.as_text(), value.as_number()) else {
            continue;
        };
        match key.to_ascii_uppercase().as_str() {
            "MESSAGES" => info.messages = Some(value),
            "RECENT" => info.recent = Some(value),
            "UNSEEN" => info.unseen = Some(value),
            "UIDNEXT" => info.uid_next = Some(value),
            "UIDVALIDITY" => info.uid_validity = Some(value),
            _ => {}
        }
    }

    Ok(Untagged::MailboxStatus {
        mailbox: utf7::decode(&raw).unwrap_or(raw),
        info,
    })
}

fn parse_fetch(cur: &mut Cursor<'_>, seq: u32) -> Result<FetchedMessage> {
    let Value::List(items) = cur.value()? else {
        return Err(cur.error("expected FETCH attribute list"));
    };

    let mut message = FetchedMessage {
        seq,
        ..FetchedMessage::default()
    };
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let Some(key) = key.as_text() else { continue };
        match key.to_ascii_uppercase().as_str() {
            "UID" => message.uid = value.as_number(),
            "FLAGS" => message.flags = flags_from(&value),
            "RFC822.SIZE" => message.size = value.as_number(),
            "INTERNALDATE" => message.internal_date = value.as_text(),
            "BODY[]" | "RFC822" => message.body = value.into_bytes(),
            _ => {}
        }
    }
    Ok(message)
}

fn flags_from(value: &Value) -> Vec<Flag> {
    match value {
        Value::List(items) => items
            .iter()
            .filter_map(Value::as_text)
            .map(|f| Flag::parse(&f))
            .collect(),
        _ => Vec::new(),
    }
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

    fn untagged(input: &[u8]) -> Untagged {
        match parse(input).unwrap() {
            Response::Untagged(u) => u,
            other => panic!("expected untagged, got {other:?}"),
        }
    }

    #[test]
    fn test_greeting_with_capabilities() {
        let u = untagged(b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=XOAUTH2] Dovecot ready.\r\n");
        assert_eq!(
            u,
            Untagged::Status {
                status: Status::Ok,
                code: Some(ResponseCode::Capability(vec![
                    "IMAP4rev1".into(),
                    "SASL-IR".into(),
                    "AUTH=XOAUTH2".into()
                ])),
                text: "Dovecot ready.".into(),
            }
        );
    }

    #[test]
    fn test_tagged() {
        let r = parse(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n").unwrap();
        assert_eq!(
            r,
            Response::Tagged {
                tag: "A0001".into(),
                status: Status::No,
                code: Some(ResponseCode::AuthenticationFailed),
                text: "Invalid credentials (Failure)".into(),
            }
        );

        let r = parse(b"A0002 OK done\r\n").unwrap();
        assert!(matches!(r, Response::Tagged { status: Status::Ok, code: None, .. }));
    }

    #[test]
    fn test_continuation() {
        assert_eq!(parse(b"+ \r\n").unwrap(), Response::Continuation(String::new()));
        assert_eq!(
            parse(b"+ eyJzdGF0dXMiOiI0MDAifQ==\r\n").unwrap(),
            Response::Continuation("eyJzdGF0dXMiOiI0MDAifQ==".into())
        );
    }

    #[test]
    fn test_select_data() {
        assert_eq!(untagged(b"* 172 EXISTS\r\n"), Untagged::Exists(172));
        assert_eq!(untagged(b"* 1 RECENT\r\n"), Untagged::Recent(1));
        assert_eq!(untagged(b"* 3 EXPUNGE\r\n"), Untagged::Expunge(3));
        assert_eq!(
            untagged(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft $Label)\r\n"),
            Untagged::Flags(vec![
                Flag::Answered,
                Flag::Flagged,
                Flag::Deleted,
                Flag::Seen,
                Flag::Draft,
                Flag::Keyword("$Label".into())
            ])
        );
        assert_eq!(
            untagged(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n"),
            Untagged::Status {
                status: Status::Ok,
                code: Some(ResponseCode::UidValidity(3857529045)),
                text: "UIDs valid".into(),
            }
        );
        assert!(matches!(
            untagged(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n"),
            Untagged::Status { code: Some(ResponseCode::Other(_)), .. }
        ));
    }

    #[test]
    fn test_list() {
        let u = untagged(b"* LIST (\\HasNoChildren \\Sent) \"/\" \"[Gmail]/Sent Mail\"\r\n");
        let Untagged::List(folder) = u else { panic!("expected LIST") };
        assert_eq!(folder.name, "[Gmail]/Sent Mail");
        assert_eq!(folder.delimiter, Some('/'));
        assert_eq!(folder.special_use(), Some(&FolderAttribute::Sent));

        let u = untagged(b"* LIST (\\Noselect) NIL &U9dP4Xux-\r\n");
        let Untagged::List(folder) = u else { panic!("expected LIST") };
        assert_eq!(folder.name, "受信箱");
        assert_eq!(folder.delimiter, None);
        assert!(!folder.is_selectable());
    }

    #[test]
    fn test_list_literal_name() {
        let u = untagged(b"* LIST () \".\" {9}\r\nodd \"name\r\n");
        let Untagged::List(folder) = u else { panic!("expected LIST") };
        assert_eq!(folder.name, "odd \"name");
    }

    #[test]
    fn test_search() {
        assert_eq!(untagged(b"* SEARCH 2 84 882\r\n"), Untagged::Search(vec![2, 84, 882]));
        assert_eq!(untagged(b"* SEARCH\r\n"), Untagged::Search(vec![]));
        assert!(parse(b"* SEARCH 1 x\r\n").is_err());
    }

    #[test]
    fn test_status() {
        let u = untagged(b"* STATUS \"INBOX\" (MESSAGES 231 UNSEEN 5 UIDNEXT 44292)\r\n");
        assert_eq!(
            u,
            Untagged::MailboxStatus {
                mailbox: "INBOX".into(),
                info: StatusInfo {
                    messages: Some(231),
                    unseen: Some(5),
                    uid_next: Some(44292),
                    ..StatusInfo::default()
                },
            }
        );
    }

    #[test]
    fn test_fetch_with_body_literal() {
        let raw = b"* 12 FETCH (UID 4827 FLAGS (\\Seen) RFC822.SIZE 44 INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" BODY[] {19}\r\nSubject: hi\r\n\r\nbody)\r\n";
        let Untagged::Fetch(message) = untagged(raw) else { panic!("expected FETCH") };
        assert_eq!(message.seq, 12);
        assert_eq!(message.uid, Some(4827));
        assert_eq!(message.flags, vec![Flag::Seen]);
        assert_eq!(message.size, Some(44));
        assert_eq!(message.internal_date.as_deref(), Some("17-Jul-1996 02:44:25 -0700"));
        assert_eq!(message.body.as_deref(), Some(&b"Subject: hi\r\n\r\nbody"[..]));
    }

    #[test]
    fn test_fetch_flags_only() {
        let Untagged::Fetch(message) = untagged(b"* 3 FETCH (FLAGS () UID 9)\r\n") else {
            panic!("expected FETCH")
        };
        assert!(message.flags.is_empty());
        assert_eq!(message.uid, Some(9));
        assert!(message.body.is_none());
    }

    #[test]
    fn test_unknown_untagged() {
        assert!(matches!(untagged(b"* NAMESPACE NIL NIL NIL\r\n"), Untagged::Other(_)));
        assert!(matches!(untagged(b"* 5 VANISHED\r\n"), Untagged::Other(_)));
    }

    #[test]
    fn test_malformed() {
        assert!(parse(b"").is_err());
        assert!(parse(b"A0001 MAYBE\r\n").is_err());
        assert!(parse(b"* LIST \"/\"\r\n").is_err());
    }
}
