//! SMTP reply parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses the lines of one reply (CRLF already stripped).
///
/// Every line must carry the same three-digit code; all but the last use
/// `-` as separator.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let first = lines
        .first()
        .ok_or_else(|| Error::Protocol("empty reply".into()))?;
    let code = reply_code(first)?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        if reply_code(line)? != code {
            return Err(Error::Protocol(format!(
                "reply code changed within reply: {line}"
            )));
        }
        match line.as_bytes().get(3) {
            None => text.push(String::new()),
            Some(b' ' | b'-') => text.push(line[4..].to_string()),
            Some(_) => return Err(Error::Protocol(format!("malformed reply line: {line}"))),
        }
    }
    Ok(Reply::new(ReplyCode::new(code), text))
}

/// True if `line` ends a reply (`250 ...` rather than `250-...`).
#[must_use]
pub fn is_last_line(line: &str) -> bool {
    line.as_bytes().get(3) != Some(&b'-')
}

fn reply_code(line: &str) -> Result<u16> {
    line.get(..3)
        .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|c| c.parse().ok())
        .filter(|c| (200..600).contains(c))
        .ok_or_else(|| Error::Protocol(format!("invalid reply code: {line}")))
}
