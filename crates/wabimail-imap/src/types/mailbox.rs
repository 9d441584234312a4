//! Mailbox (folder) types.

use super::Flag;

/// A folder returned by LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Decoded folder name (modified UTF-7 already undone).
    pub name: String,
    /// Hierarchy delimiter, if the server uses one.
    pub delimiter: Option<char>,
    /// LIST attributes.
    pub attributes: Vec<FolderAttribute>,
}

impl Folder {
    /// Returns false for `\Noselect` / `\NonExistent` entries.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| matches!(a, FolderAttribute::NoSelect | FolderAttribute::NonExistent))
    }

    /// Returns the RFC 6154 special-use attribute, if any.
    #[must_use]
    pub fn special_use(&self) -> Option<&FolderAttribute> {
        self.attributes.iter().find(|a| a.is_special_use())
    }
}

/// Folder attributes from LIST responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FolderAttribute {
    /// Cannot be selected.
    NoSelect,
    /// Placeholder for a folder that does not exist.
    NonExistent,
    /// Has no children.
    HasNoChildren,
    /// Has children.
    HasChildren,
    /// Marked by the server as interesting.
    Marked,
    /// Not marked.
    Unmarked,
    /// Virtual folder with every message.
    All,
    /// Archive folder.
    Archive,
    /// Drafts folder.
    Drafts,
    /// Virtual folder with flagged messages.
    Flagged,
    /// Junk/spam folder.
    Junk,
    /// Sent folder.
    Sent,
    /// Trash folder.
    Trash,
    /// Anything else.
    Other(String),
}

impl FolderAttribute {
    /// Parses an attribute atom such as `\HasChildren`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NONEXISTENT" => Self::NonExistent,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            _ => Self::Other(s.to_string()),
        }
    }

    const fn is_special_use(&self) -> bool {
        matches!(
            self,
            Self::All | Self::Archive | Self::Drafts | Self::Flagged | Self::Junk | Self::Sent | Self::Trash
        )
    }
}

/// State of the selected mailbox as reported by SELECT/EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// Sequence number of the first unseen message.
    pub first_unseen: Option<u32>,
    /// Next UID to be assigned.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY of the mailbox.
    pub uid_validity: Option<u32>,
    /// Flags defined in the mailbox.
    pub flags: Vec<Flag>,
    /// True when opened read-only.
    pub read_only: bool,
}

/// Counters returned by STATUS for a mailbox that is not selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInfo {
    /// Number of messages.
    pub messages: Option<u32>,
    /// Number of recent messages.
    pub recent: Option<u32>,
    /// Number of messages without `\Seen`.
    pub unseen: Option<u32>,
    /// Next UID to be assigned.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY of the mailbox.
    pub uid_validity: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_parse() {
        assert_eq!(FolderAttribute::parse("\\Noselect"), FolderAttribute::NoSelect);
        assert_eq!(FolderAttribute::parse("\\Spam"), FolderAttribute::Junk);
        assert_eq!(
            FolderAttribute::parse("\\Custom"),
            FolderAttribute::Other("\\Custom".into())
        );
    }

    #[test]
    fn test_folder_helpers() {
        let folder = Folder {
            name: "[Gmail]".into(),
            delimiter: Some('/'),
            attributes: vec![FolderAttribute::NoSelect, FolderAttribute::HasChildren],
        };
        assert!(!folder.is_selectable());
        assert!(folder.special_use().is_none());

        let sent = Folder {
            name: "[Gmail]/Sent Mail".into(),
            delimiter: Some('/'),
            attributes: vec![FolderAttribute::HasNoChildren, FolderAttribute::Sent],
        };
        assert!(sent.is_selectable());
        assert_eq!(sent.special_use(), Some(&FolderAttribute::Sent));
    }
}
