//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 header encoding.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum encoded line length (RFC 2045).
const MAX_LINE_LENGTH: usize = 76;

/// Raw bytes per RFC 2047 encoded-word, keeps each word under 75 chars.
const ENCODED_WORD_CHUNK: usize = 45;

/// Encodes data as Base64 without line breaks.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped at 76 columns with CRLF line breaks,
/// as required for message bodies.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);
    for (i, chunk) in encoded.as_bytes().chunks(MAX_LINE_LENGTH).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input (LF or CRLF) become hard CRLF breaks; longer
/// lines get soft breaks. Trailing whitespace on a line is escaped.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        encode_qp_line(line.as_bytes(), &mut out);
    }
    out
}

fn encode_qp_line(bytes: &[u8], out: &mut String) {
    let mut column = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        let last = i + 1 == bytes.len();
        let literal = matches!(byte, b'!'..=b'<' | b'>'..=b'~')
            || (matches!(byte, b' ' | b'\t') && !last);
        let width = if literal { 1 } else { 3 };

        // Leave room for the '=' of a soft break.
        if column + width > MAX_LINE_LENGTH - 1 {
            out.push_str("=\r\n");
            column = 0;
        }

        if literal {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "={byte:02X}");
        }
        column += width;
    }
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// Malformed escapes are kept literally rather than rejected, matching
/// what mail readers do with real-world messages.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        match (data.get(i + 1), data.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(&hi), Some(&lo)) => match (hex_value(hi), hex_value(lo)) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            },
            // Soft break at end of input or a dangling '='.
            (None, _) => i += 1,
            (Some(_), None) => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

/// Encodes a header value using RFC 2047 `B` encoded-words when needed.
///
/// Pure printable ASCII is returned unchanged. Longer values are split
/// into several encoded-words on character boundaries, folded with CRLF
/// and a space.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    let needs_encoding = text.contains("=?")
        || text
            .chars()
            .any(|c| !c.is_ascii() || (c.is_ascii_control() && c != '\t'));
    if !needs_encoding {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(format!("=?utf-8?B?{}?=", encode_base64(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?B?{}?=", encode_base64(chunk.as_bytes())));
    }
    words.join("\r\n ")
}

/// Decodes every RFC 2047 encoded-word in a header value.
///
/// Whitespace between two adjacent encoded-words is dropped; text that is
/// not a well-formed encoded-word is kept as is.
#[must_use]
pub fn decode_rfc2047(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut previous_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_encoded_word(candidate) {
            if !(previous_was_encoded && before.trim().is_empty()) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            previous_was_encoded = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            previous_was_encoded = false;
        }
    }
    out.push_str(rest);
    out
}

fn decode_encoded_word(word: &str) -> Option<(String, usize)> {
    let body = word.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let text = &body[..end];
    if charset.is_empty() || text.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(text.as_bytes()).ok()?,
        "Q" | "q" => decode_q(text),
        _ => return None,
    };

    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    // RFC 2231 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    Some((decode_charset(&bytes, charset), consumed))
}

fn decode_q(text: &str) -> Vec<u8> {
    let spaced: Vec<u8> = text
        .bytes()
        .map(|b| if b == b'_' { b' ' } else { b })
        .collect();
    decode_quoted_printable(&spaced)
}

/// Converts bytes in `charset` to a `String`.
///
/// UTF-8 and the Latin-1 family are decoded exactly; anything else is
/// decoded as lossy UTF-8.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: &str) -> String {
    match charset.trim().to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "latin-1" | "windows-1252" | "cp1252" => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_lines_wrap_at_76() {
        let encoded = encode_base64_lines(&[0u8; 120]);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.len() <= 76));
        assert_eq!(decode_base64(encoded.as_bytes()).unwrap(), vec![0u8; 120]);
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");
        assert_eq!(encode_quoted_printable("Héllo"), "H=C3=A9llo");
        assert_eq!(encode_quoted_printable("a=b"), "a=3Db");
    }

    #[test]
    fn test_quoted_printable_line_breaks() {
        assert_eq!(encode_quoted_printable("one\ntwo\r\nthree"), "one\r\ntwo\r\nthree");
        assert_eq!(encode_quoted_printable("trailing \nx"), "trailing=20\r\nx");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let long = "x".repeat(200);
        let encoded = encode_quoted_printable(&long);
        assert!(encoded.split("\r\n").all(|l| l.len() <= 76));
        assert_eq!(decode_quoted_printable(encoded.as_bytes()), long.as_bytes());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo"), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld"), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"100=%"), b"100=%");
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello"), "Hello");
        let encoded = encode_rfc2047("Héllo");
        assert_eq!(encoded, "=?utf-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_rfc2047_encode_long_value_folds() {
        let subject = "日本語の件名".repeat(6);
        let encoded = encode_rfc2047(&subject);
        assert!(encoded.contains("\r\n "));
        assert!(encoded.split("\r\n ").all(|w| w.len() <= 75));
        assert_eq!(decode_rfc2047(&encoded.replace("\r\n", "")), subject);
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello"), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_rfc2047("=?UTF-8?Q?H=C3=A9llo_world?="), "Héllo world");
        assert_eq!(decode_rfc2047("=?iso-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_rfc2047_decode_mixed() {
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?B?SMOpbGxv?= =?utf-8?B?IHdvcmxk?= !"),
            "Re: Héllo world !"
        );
        assert_eq!(decode_rfc2047("a =?broken"), "a =?broken");
    }

    proptest! {
        #[test]
        fn prop_quoted_printable_round_trip(text in "[ -~\u{e0}-\u{ff}]{0,300}") {
            let encoded = encode_quoted_printable(&text);
            prop_assert!(encoded.split("\r\n").all(|l| l.len() <= 76));
            let decoded = decode_quoted_printable(encoded.as_bytes());
            prop_assert_eq!(String::from_utf8(decoded).unwrap(), text);
        }

        #[test]
        fn prop_rfc2047_round_trip(text in "\\PC{0,80}") {
            let encoded = encode_rfc2047(&text);
            prop_assert_eq!(decode_rfc2047(&encoded.replace("\r\n", "")), text);
        }
    }
}
