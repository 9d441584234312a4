//! Envelope addresses.

use std::fmt;

use crate::error::{Error, Result};

/// Address used in `MAIL FROM` and `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates and wraps an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address has no single `@`,
    /// an empty side, or characters that would break the command line.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(Error::InvalidAddress(format!("{addr:?} contains invalid characters")));
        }
        match addr.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                Ok(Self(addr))
            }
            _ => Err(Error::InvalidAddress(format!(
                "{addr:?} must be local@domain"
            ))),
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-ASCII addresses need SMTPUTF8.
    #[must_use]
    pub fn is_ascii(&self) -> bool {
        self.0.is_ascii()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid() {
        assert_eq!(Address::new("user@example.com").unwrap().as_str(), "user@example.com");
        assert!(!Address::new("山田@例え.jp").unwrap().is_ascii());
    }

    #[test]
    fn test_invalid() {
        for bad in [
            "",
            "userexample.com",
            "@example.com",
            "user@",
            "a@b@c",
            "user@example.com>\r\nRCPT TO:<x@y",
            "us er@example.com",
        ] {
            assert!(Address::new(bad).is_err(), "{bad:?} accepted");
        }
    }
}
