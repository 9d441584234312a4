//! Status lines and listings.

use crate::error::{Error, Result};
use crate::types::{ListEntry, Stat, UidlEntry};

/// First line of a server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// `+OK text`.
    Ok(String),
    /// `-ERR text`.
    Err(String),
    /// `+ challenge` during AUTH.
    Continuation(String),
}

/// Parses a status line (CRLF already stripped).
///
/// # Errors
///
/// Returns [`Error::Protocol`] for anything but `+OK`, `-ERR` or `+`.
pub fn parse_status(line: &str) -> Result<Status> {
    let text = |rest: &str| rest.strip_prefix(' ').unwrap_or(rest).to_string();
    if let Some(rest) = strip_prefix_ignore_case(line, "+OK") {
        Ok(Status::Ok(text(rest)))
    } else if let Some(rest) = strip_prefix_ignore_case(line, "-ERR") {
        Ok(Status::Err(text(rest)))
    } else if let Some(rest) = line.strip_prefix('+') {
        Ok(Status::Continuation(text(rest)))
    } else {
        Err(Error::Protocol(format!("unexpected status line: {line}")))
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    let rest = &line[prefix.len()..];
    (head.eq_ignore_ascii_case(prefix) && (rest.is_empty() || rest.starts_with(' '))).then_some(rest)
}

/// Parses `count size` from a STAT answer.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the numbers are missing.
pub fn parse_stat(text: &str) -> Result<Stat> {
    let mut words = text.split_whitespace();
    let count = words.next().and_then(|w| w.parse().ok());
    let size = words.next().and_then(|w| w.parse().ok());
    match (count, size) {
        (Some(count), Some(size)) => Ok(Stat { count, size }),
        _ => Err(Error::Protocol(format!("malformed STAT answer: {text}"))),
    }
}

/// Parses `number size`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line is malformed.
pub fn parse_list_entry(line: &str) -> Result<ListEntry> {
    let mut words = line.split_whitespace();
    let number = words.next().and_then(|w| w.parse().ok());
    let size = words.next().and_then(|w| w.parse().ok());
    match (number, size) {
        (Some(number), Some(size)) => Ok(ListEntry { number, size }),
        _ => Err(Error::Protocol(format!("malformed LIST line: {line}"))),
    }
}

/// Parses `number unique-id`. The id is 1-70 printable ASCII characters.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line is malformed.
pub fn parse_uidl_entry(line: &str) -> Result<UidlEntry> {
    let mut words = line.split_whitespace();
    let number = words.next().and_then(|w| w.parse().ok());
    let uid = words
        .next()
        .filter(|u| u.len() <= 70 && u.bytes().all(|b| (0x21..=0x7e).contains(&b)));
    match (number, uid) {
        (Some(number), Some(uid)) => Ok(UidlEntry {
            number,
            uid: uid.to_string(),
        }),
        _ => Err(Error::Protocol(format!("malformed UIDL line: {line}"))),
    }
}

/// Removes the byte-stuffing of a multi-line block line: a leading `..`
/// stands for `.`.
#[must_use]
pub fn unstuff(line: &[u8]) -> &[u8] {
    if line.starts_with(b"..") { &line[1..] } else { line }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status() {
        assert_eq!(parse_status("+OK POP3 ready").unwrap(), Status::Ok("POP3 ready".into()));
        assert_eq!(parse_status("+OK").unwrap(), Status::Ok(String::new()));
        assert_eq!(parse_status("-ERR no such message").unwrap(), Status::Err("no such message".into()));
        assert_eq!(parse_status("+ ").unwrap(), Status::Continuation(String::new()));
        assert_eq!(parse_status("+ eyJ9").unwrap(), Status::Continuation("eyJ9".into()));
        assert_eq!(parse_status("+ok lower").unwrap(), Status::Ok("lower".into()));
        assert!(parse_status("* OK imap").is_err());
        assert!(parse_status("").is_err());
    }

    #[test]
    fn test_stat() {
        assert_eq!(parse_stat("2 320").unwrap(), Stat { count: 2, size: 320 });
        assert!(parse_stat("2").is_err());
        assert!(parse_stat("two 320").is_err());
    }

    #[test]
    fn test_listings() {
        assert_eq!(parse_list_entry("1 120").unwrap(), ListEntry { number: 1, size: 120 });
        assert_eq!(
            parse_uidl_entry("2 QhdPYR:00WBw1Ph7x7").unwrap(),
            UidlEntry {
                number: 2,
                uid: "QhdPYR:00WBw1Ph7x7".into()
            }
        );
        assert!(parse_uidl_entry("2").is_err());
        assert!(parse_uidl_entry(&format!("1 {}", "x".repeat(71))).is_err());
    }

    #[test]
    fn test_unstuff() {
        assert_eq!(unstuff(b"..hidden"), b".hidden");
        assert_eq!(unstuff(b".x"), b".x");
        assert_eq!(unstuff(b"plain"), b"plain");
    }

    proptest! {
        #[test]
        fn prop_uidl_accepts_printable_ids(number in 1u32..100_000, uid in "[!-~]{1,70}") {
            let entry = parse_uidl_entry(&format!("{number} {uid}")).unwrap();
            prop_assert_eq!(entry.number, number);
            prop_assert_eq!(entry.uid, uid);
        }
    }
}
