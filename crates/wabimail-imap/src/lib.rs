//! # wabimail-imap
//!
//! Async IMAP4rev1 client used by the WabiMail receive path.
//!
//! ## Features
//!
//! - **Type-state connection**: `NotAuthenticated` → `Authenticated` →
//!   `Selected`, each state exposing only the commands valid in it
//! - **Transport security**: implicit TLS, STARTTLS or plaintext via rustls
//! - **Authentication**: LOGIN and `AUTHENTICATE XOAUTH2` (with SASL-IR)
//! - **Mailbox operations**: LIST, STATUS, SELECT/EXAMINE, UID SEARCH,
//!   UID FETCH, UID STORE, UID COPY/MOVE, EXPUNGE
//! - **Modified UTF-7** folder names, decoded on LIST and encoded on send
//!
//! ## Quick Start
//!
//! ```ignore
//! use wabimail_imap::{Client, Config, SearchCriteria};
//!
//! #[tokio::main]
//! async fn main() -> wabimail_imap::Result<()> {
//!     let config = Config::new("imap.example.com");
//!     let client = Client::connect(&config).await?;
//!     let mut client = client.login("user@example.com", "password").await?;
//!
//!     for folder in client.list("", "*").await? {
//!         println!("{}", folder.name);
//!     }
//!
//!     let mut inbox = client.select("INBOX").await?;
//!     let unseen = inbox.uid_search(SearchCriteria::Unseen).await?;
//!     for message in inbox.uid_fetch(&unseen).await? {
//!         println!("{:?} {:?}", message.uid, message.size);
//!     }
//!
//!     inbox.logout().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command lines, tags and UID sets
//! - [`connection`]: transport and the type-state client
//! - [`parser`]: response parser
//! - [`types`]: flags, folders and fetched data
//! - [`utf7`]: modified UTF-7 mailbox names

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;
pub mod utf7;

pub use command::{CommandLine, TagGenerator};
pub use connection::{
    Authenticated, Client, Config, FramedStream, ImapStream, NotAuthenticated, Security, Selected,
    Session,
};
pub use error::{Error, Result};
pub use parser::{Response, Untagged};
pub use types::{
    FetchedMessage, Flag, Folder, FolderAttribute, MailboxStatus, SearchCriteria, StatusInfo,
    StoreAction,
};
