//! IMAP data types.

mod flags;
mod mailbox;

pub use flags::{Flag, StoreAction};
pub use mailbox::{Folder, FolderAttribute, MailboxStatus, StatusInfo};

/// Data returned for one message by `UID FETCH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Message sequence number.
    pub seq: u32,
    /// Unique identifier within the mailbox.
    pub uid: Option<u32>,
    /// Current flags.
    pub flags: Vec<Flag>,
    /// `RFC822.SIZE`.
    pub size: Option<u32>,
    /// `INTERNALDATE` as sent by the server.
    pub internal_date: Option<String>,
    /// Full message bytes from `BODY[]`.
    pub body: Option<Vec<u8>>,
}

/// Criteria for `UID SEARCH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchCriteria {
    /// Every message.
    #[default]
    All,
    /// Messages without `\Seen`.
    Unseen,
    /// Messages with `\Seen`.
    Seen,
    /// Messages with `\Flagged`.
    Flagged,
    /// Messages with `\Deleted`.
    Deleted,
}

impl SearchCriteria {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Unseen => "UNSEEN",
            Self::Seen => "SEEN",
            Self::Flagged => "FLAGGED",
            Self::Deleted => "DELETED",
        }
    }
}
