//! POP3 command lines.

use std::fmt;

/// A POP3 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// USER name.
    User(String),
    /// PASS secret.
    Pass(String),
    /// AUTH mechanism with an initial response (RFC 5034).
    Auth {
        /// Mechanism name.
        mechanism: &'static str,
        /// Base64 initial response.
        initial_response: String,
    },
    /// CAPA (RFC 2449).
    Capa,
    /// STLS (RFC 2595).
    Stls,
    /// STAT.
    Stat,
    /// LIST, for every message or one.
    List(Option<u32>),
    /// UIDL, for every message or one.
    Uidl(Option<u32>),
    /// RETR n.
    Retr(u32),
    /// TOP n lines.
    Top(u32, u32),
    /// DELE n.
    Dele(u32),
    /// RSET.
    Rset,
    /// NOOP.
    Noop,
    /// QUIT.
    Quit,
}

impl Command {
    /// Serializes the command with its CRLF terminator.
    #[must_use]
    pub fn serialize(&self) -> String {
        format!("{self}\r\n")
    }

    /// Form safe for logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass(_) => "PASS ***".to_string(),
            Self::Auth { mechanism, .. } => format!("AUTH {mechanism} ***"),
            other => other.to_string(),
        }
    }

    /// Commands answered with a dot-terminated block after `+OK`.
    #[must_use]
    pub const fn is_multiline(&self) -> bool {
        matches!(
            self,
            Self::Capa | Self::List(None) | Self::Uidl(None) | Self::Retr(_) | Self::Top(..)
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "USER {name}"),
            Self::Pass(secret) => write!(f, "PASS {secret}"),
            Self::Auth {
                mechanism,
                initial_response,
            } => write!(f, "AUTH {mechanism} {initial_response}"),
            Self::Capa => f.write_str("CAPA"),
            Self::Stls => f.write_str("STLS"),
            Self::Stat => f.write_str("STAT"),
            Self::List(None) => f.write_str("LIST"),
            Self::List(Some(n)) => write!(f, "LIST {n}"),
            Self::Uidl(None) => f.write_str("UIDL"),
            Self::Uidl(Some(n)) => write!(f, "UIDL {n}"),
            Self::Retr(n) => write!(f, "RETR {n}"),
            Self::Top(n, lines) => write!(f, "TOP {n} {lines}"),
            Self::Dele(n) => write!(f, "DELE {n}"),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        assert_eq!(Command::User("taro".into()).serialize(), "USER taro\r\n");
        assert_eq!(Command::Top(3, 0).serialize(), "TOP 3 0\r\n");
        assert_eq!(Command::Uidl(None).serialize(), "UIDL\r\n");
        assert_eq!(Command::List(Some(2)).serialize(), "LIST 2\r\n");
    }

    #[test]
    fn test_redacted() {
        assert_eq!(Command::Pass("hunter2".into()).redacted(), "PASS ***");
        let auth = Command::Auth {
            mechanism: "XOAUTH2",
            initial_response: "dXNlcj0...".into(),
        };
        assert_eq!(auth.redacted(), "AUTH XOAUTH2 ***");
        assert_eq!(Command::Retr(1).redacted(), "RETR 1");
    }

    #[test]
    fn test_multiline() {
        assert!(Command::Uidl(None).is_multiline());
        assert!(!Command::Uidl(Some(1)).is_multiline());
        assert!(Command::Top(1, 0).is_multiline());
        assert!(!Command::Dele(1).is_multiline());
    }
}
