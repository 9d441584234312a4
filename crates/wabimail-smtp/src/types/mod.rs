//! Core SMTP types.

mod address;
mod delivery;
mod extension;
mod reply;

pub use address::Address;
pub use delivery::{Delivery, RejectedRecipient};
pub use extension::{AuthMechanism, Capabilities};
pub use reply::{Reply, ReplyCode};
