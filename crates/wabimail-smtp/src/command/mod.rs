//! SMTP command lines.

use std::fmt;

use crate::types::{Address, AuthMechanism};

/// An SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO, for servers without ESMTP.
    Helo(String),
    /// EHLO.
    Ehlo(String),
    /// STARTTLS.
    StartTls,
    /// AUTH with an initial response.
    Auth {
        /// Mechanism.
        mechanism: AuthMechanism,
        /// Base64 initial response.
        initial_response: String,
    },
    /// MAIL FROM with optional ESMTP parameters.
    MailFrom {
        /// Reverse path.
        from: Address,
        /// `SIZE=` parameter.
        size: Option<usize>,
        /// `BODY=8BITMIME`.
        eight_bit: bool,
        /// `SMTPUTF8`.
        smtp_utf8: bool,
    },
    /// RCPT TO.
    RcptTo(Address),
    /// DATA.
    Data,
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

    /// Form safe for logs: AUTH responses are hidden.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth { mechanism, .. } => format!("AUTH {} ***", mechanism.as_str()),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(host) => write!(f, "HELO {host}"),
            Self::Ehlo(host) => write!(f, "EHLO {host}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth {
                mechanism,
                initial_response,
            } => write!(f, "AUTH {} {initial_response}", mechanism.as_str()),
            Self::MailFrom {
                from,
                size,
                eight_bit,
                smtp_utf8,
            } => {
                write!(f, "MAIL FROM:<{from}>")?;
                if let Some(size) = size {
                    write!(f, " SIZE={size}")?;
                }
                if *eight_bit {
                    f.write_str(" BODY=8BITMIME")?;
                }
                if *smtp_utf8 {
                    f.write_str(" SMTPUTF8")?;
                }
                Ok(())
            }
            Self::RcptTo(to) => write!(f, "RCPT TO:<{to}>"),
            Self::Data => f.write_str("DATA"),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

/// Prepares message content for DATA: CRLF line endings, leading dots
/// doubled, and the terminating `.` line appended.
#[must_use]
pub fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    if !message.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b".\r\n");
    out
}
