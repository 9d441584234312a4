//! # wabimail-mime
//!
//! MIME message parsing and generation for WabiMail.
//!
//! ## Features
//!
//! - **Parsing**: headers, nested multipart trees, attachments
//! - **Generation**: text, HTML alternative and attachments
//! - **Encodings**: Base64, Quoted-Printable, RFC 2047 encoded words
//! - **Addresses**: `Name <addr>` mailboxes and address lists
//!
//! ## Quick Start
//!
//! ### Parsing
//!
//! ```ignore
//! use wabimail_mime::Message;
//!
//! let message = Message::parse(raw_bytes)?;
//! println!("Subject: {}", message.subject().unwrap_or_default());
//! println!("Body: {}", message.text_body().unwrap_or_default());
//! for attachment in message.attachments() {
//!     println!("{:?} ({} bytes)", attachment.filename, attachment.size);
//! }
//! ```
//!
//! ### Building
//!
//! ```ignore
//! use wabimail_mime::{Attachment, Mailbox, MessageBuilder};
//!
//! let raw = MessageBuilder::new()
//!     .from(Mailbox::new("sender@example.com")?.with_name("Sender"))
//!     .to(Mailbox::new("recipient@example.com")?)
//!     .subject("Report")
//!     .text_body("Plain text version")
//!     .html_body("<p>HTML version</p>")
//!     .attach(Attachment::new("report.pdf", pdf_bytes))
//!     .build()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod builder;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::Mailbox;
pub use builder::{Attachment, MessageBuilder};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{AttachmentInfo, Message, Part, TransferEncoding};
