//! Per-recipient outcome of a transaction.

use super::Address;

/// A recipient the server refused at `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecipient {
    /// The refused address.
    pub address: Address,
    /// Reply code.
    pub code: u16,
    /// Server text.
    pub message: String,
}

/// Result of a completed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients the server accepted.
    pub accepted: Vec<Address>,
    /// Recipients the server refused.
    pub rejected: Vec<RejectedRecipient>,
    /// Text of the final reply to the message data (often a queue id).
    pub response: String,
}

impl Delivery {
    /// Some, but not all, recipients were refused.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty() && !self.accepted.is_empty()
    }
}
