//! Command encoding.
//!
//! A command is rendered into [`Segment`]s: plain text, or a synchronizing
//! literal the client may only send after the server's `+` continuation.

mod tag_generator;

pub use tag_generator::TagGenerator;

use crate::utf7;

/// One piece of an encoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Bytes that can be written immediately.
    Text(String),
    /// Literal payload, announced by the preceding text's `{n}`.
    Literal(Vec<u8>),
}

/// Incremental builder for a tagged command line.
#[derive(Debug)]
pub struct CommandLine {
    segments: Vec<Segment>,
    current: String,
}

impl CommandLine {
    /// Starts a command: `<tag> <name>`.
    #[must_use]
    pub fn new(tag: &str, name: &str) -> Self {
        Self {
            segments: Vec::new(),
            current: format!("{tag} {name}"),
        }
    }

    /// Appends a raw token; the caller guarantees it is valid on the wire.
    #[must_use]
    pub fn raw(mut self, token: &str) -> Self {
        self.current.push(' ');
        self.current.push_str(token);
        self
    }

    /// Appends an astring as an atom, a quoted string or a literal.
    #[must_use]
    pub fn astring(mut self, value: &str) -> Self {
        self.current.push(' ');
        if is_atom(value) {
            self.current.push_str(value);
        } else if value.is_ascii() && !value.contains(['\r', '\n', '\0']) {
            self.current.push('"');
            for ch in value.chars() {
                if ch == '"' || ch == '\\' {
                    self.current.push('\\');
                }
                self.current.push(ch);
            }
            self.current.push('"');
        } else {
            self.current.push_str(&format!("{{{}}}\r\n", value.len()));
            self.segments
                .push(Segment::Text(std::mem::take(&mut self.current)));
            self.segments.push(Segment::Literal(value.as_bytes().to_vec()));
        }
        self
    }

    /// Appends a mailbox name, modified-UTF-7 encoded.
    #[must_use]
    pub fn mailbox(self, name: &str) -> Self {
        let encoded = utf7::encode(name);
        self.astring(&encoded)
    }

    /// Terminates the line and returns its segments.
    #[must_use]
    pub fn finish(mut self) -> Vec<Segment> {
        self.current.push_str("\r\n");
        self.segments.push(Segment::Text(self.current));
        self.segments
    }
}

fn is_atom(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"(){%*\"\\".contains(&b))
}

/// Renders UIDs as a compact set (`1:3,7,9:10`). Returns `None` when empty.
#[must_use]
pub fn uid_set(uids: &[u32]) -> Option<String> {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for uid in sorted {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(uid) => *end = uid,
            _ => ranges.push((uid, uid)),
        }
    }
    if ranges.is_empty() {
        return None;
    }

    Some(
        ranges
            .iter()
            .map(|&(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}:{end}")
                }
            })
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn text(segments: &[Segment]) -> String {
        match segments {
            [Segment::Text(t)] => t.clone(),
            other => panic!("expected single text segment, got {other:?}"),
        }
    }

    #[test]
    fn test_atom_and_quoted() {
        let cmd = CommandLine::new("A0001", "LOGIN")
            .astring("user@example.com")
            .astring("pa ss\"word\\")
            .finish();
        assert_eq!(
            text(&cmd),
            "A0001 LOGIN user@example.com \"pa ss\\\"word\\\\\"\r\n"
        );
    }

    #[test]
    fn test_empty_string_is_quoted() {
        let cmd = CommandLine::new("A0002", "LIST").astring("").raw("*").finish();
        assert_eq!(text(&cmd), "A0002 LIST \"\" *\r\n");
    }

    #[test]
    fn test_non_ascii_becomes_literal() {
        let cmd = CommandLine::new("A0003", "LOGIN")
            .astring("taro")
            .astring("パス")
            .finish();
        assert_eq!(
            cmd,
            vec![
                Segment::Text("A0003 LOGIN taro {6}\r\n".into()),
                Segment::Literal("パス".as_bytes().to_vec()),
                Segment::Text("\r\n".into()),
            ]
        );
    }

    #[test]
    fn test_mailbox_encoding() {
        let cmd = CommandLine::new("A0004", "SELECT").mailbox("[Gmail]/Sent Mail").finish();
        assert_eq!(text(&cmd), "A0004 SELECT \"[Gmail]/Sent Mail\"\r\n");

        let cmd = CommandLine::new("A0005", "SELECT").mailbox("受信箱").finish();
        assert_eq!(text(&cmd), "A0005 SELECT &U9dP4Xux-\r\n");
    }

    #[test]
    fn test_uid_set() {
        assert_eq!(uid_set(&[]), None);
        assert_eq!(uid_set(&[5]).as_deref(), Some("5"));
        assert_eq!(uid_set(&[3, 1, 2, 7, 9, 10, 9]).as_deref(), Some("1:3,7,9:10"));
        assert_eq!(uid_set(&[u32::MAX, 1]).as_deref(), Some("1,4294967295"));
    }
}
