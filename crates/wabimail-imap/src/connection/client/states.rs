//! State markers for [`Client`](super::Client).

use crate::types::MailboxStatus;

/// After the greeting; only authentication is possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotAuthenticated;

/// Logged in; mailbox-level commands are possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

/// A mailbox is open; message-level commands are possible.
#[derive(Debug, Clone)]
pub struct Selected {
    pub(crate) mailbox: String,
    pub(crate) status: MailboxStatus,
}

impl Selected {
    /// Name of the open mailbox.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Snapshot from SELECT/EXAMINE.
    #[must_use]
    pub const fn status(&self) -> &MailboxStatus {
        &self.status
    }

    /// True when opened with EXAMINE or the server refused write access.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.status.read_only
    }
}

/// States in which the client is logged in: [`Authenticated`] and
/// [`Selected`]. Mailbox-level commands such as LIST and STATUS work in
/// both.
pub trait Session: sealed::Sealed {}

impl Session for Authenticated {}
impl Session for Selected {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Authenticated {}
    impl Sealed for super::Selected {}
}
