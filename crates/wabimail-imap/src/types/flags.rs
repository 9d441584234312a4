//! Message flags.

use std::fmt;

/// A message flag as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// First session to see the message.
    Recent,
    /// Any other keyword (e.g. `$Forwarded`).
    Keyword(String),
}

impl Flag {
    /// Parses a flag atom; system flags are matched case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Wire form of the flag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(s) => s,
        }
    }

    /// `\Recent` is maintained by the server and cannot be stored.
    #[must_use]
    pub const fn is_storable(&self) -> bool {
        !matches!(self, Self::Recent)
    }

    /// Keywords must be atoms; a keyword with spaces or specials cannot be
    /// sent.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Keyword(k) => {
                !k.is_empty()
                    && k.bytes().all(|b| {
                        b.is_ascii_graphic() && !b"(){%*\"\\]".contains(&b)
                    })
            }
            _ => true,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How STORE combines the given flags with the current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
    /// `FLAGS`
    Replace,
}

impl StoreAction {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+FLAGS.SILENT",
            Self::Remove => "-FLAGS.SILENT",
            Self::Replace => "FLAGS.SILENT",
        }
    }
}
