//! Mailbox addresses as they appear in From/To/Cc headers.

use crate::encoding::{decode_rfc2047, encode_rfc2047};
use crate::error::{Error, Result};
use std::fmt;

/// A display name plus address, e.g. `"Taro Yamada" <taro@example.com>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (decoded).
    pub name: Option<String>,
    /// Bare address, `local@domain`.
    pub email: String,
}

impl Mailbox {
    /// Creates a mailbox from a bare address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address has no `@` or an empty side.
    pub fn new(email: impl Into<String>) -> Result<Self> {
        let email = email.into();
        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Ok(Self { name: None, email })
            }
            _ => Err(Error::InvalidAddress(email)),
        }
    }

    /// Sets the display name; empty names are dropped.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.trim().is_empty()).then_some(name);
        self
    }

    /// Parses `Name <addr>`, `<addr>` or a bare `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid address can be found.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let (Some(open), true) = (s.rfind('<'), s.ends_with('>')) {
            let email = s[open + 1..s.len() - 1].trim();
            let name = s[..open].trim().trim_matches('"').trim();
            return Ok(Self::new(email)?.with_name(decode_rfc2047(name)));
        }
        Self::new(s)
    }

    /// Parses a comma separated address list, skipping entries that do not
    /// parse. Commas inside quotes or angle brackets do not split.
    #[must_use]
    pub fn parse_list(s: &str) -> Vec<Self> {
        let mut entries = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for ch in s.chars() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' if !in_quotes && !in_angle => {
                    entries.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        entries.push(current);

        entries
            .iter()
            .filter(|e| !e.trim().is_empty())
            .filter_map(|e| Self::parse(e).ok())
            .collect()
    }
}

impl fmt::Display for Mailbox {
    /// Header form: the display name is quoted when it holds specials and
    /// RFC 2047 encoded when it is not ASCII.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            None => write!(f, "{}", self.email),
            Some(name) if !name.is_ascii() => {
                write!(f, "{} <{}>", encode_rfc2047(name), self.email)
            }
            Some(name) if name.contains(|c: char| "()<>[]:;@\\,.\"".contains(c)) => {
                write!(f, "\"{}\" <{}>", name.replace('"', "\\\""), self.email)
            }
            Some(name) => write!(f, "{name} <{}>", self.email),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        assert!(Mailbox::new("user@example.com").is_ok());
        assert!(Mailbox::new("user").is_err());
        assert!(Mailbox::new("@example.com").is_err());
        assert!(Mailbox::new("a@b@c").is_err());
    }

    #[test]
    fn test_parse_forms() {
        let m = Mailbox::parse("\"Yamada, Taro\" <taro@example.com>").unwrap();
        assert_eq!(m.name.as_deref(), Some("Yamada, Taro"));
        assert_eq!(m.email, "taro@example.com");

        let m = Mailbox::parse("<bare@example.com>").unwrap();
        assert!(m.name.is_none());

        let m = Mailbox::parse("plain@example.com").unwrap();
        assert_eq!(m.email, "plain@example.com");

        let m = Mailbox::parse("=?utf-8?B?5bGx55Sw?= <y@example.com>").unwrap();
        assert_eq!(m.name.as_deref(), Some("山田"));
    }

    #[test]
    fn test_parse_list() {
        let list = Mailbox::parse_list(
            "\"Doe, Jane\" <jane@example.com>, bob@example.com, , broken",
        );
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].email, "jane@example.com");
        assert_eq!(list[1].email, "bob@example.com");
    }

    #[test]
    fn test_display() {
        let m = Mailbox::new("a@example.com").unwrap();
        assert_eq!(m.to_string(), "a@example.com");
        assert_eq!(
            m.clone().with_name("Alice").to_string(),
            "Alice <a@example.com>"
        );
        assert_eq!(
            m.clone().with_name("Doe, Jane").to_string(),
            "\"Doe, Jane\" <a@example.com>"
        );
        assert_eq!(
            m.with_name("山田").to_string(),
            "=?utf-8?B?5bGx55Sw?= <a@example.com>"
        );
    }
}
