//! Maildrop listings.

/// Answer to STAT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Messages in the maildrop, excluding those marked deleted.
    pub count: u32,
    /// Total size in octets.
    pub size: u64,
}

/// One line of a LIST answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    /// Message number, valid for this session only.
    pub number: u32,
    /// Size in octets.
    pub size: u64,
}

/// One line of a UIDL answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlEntry {
    /// Message number, valid for this session only.
    pub number: u32,
    /// Identifier stable across sessions.
    pub uid: String,
}
