//! # wabimail-core
//!
//! Account management, credential storage and protocol adapters for
//! WabiMail.
//!
//! This crate provides:
//! - Accounts with validation, provider presets and a default account
//! - `SQLite` persistence of the account set
//! - Encrypted per-account credential storage
//! - `OAuth2` sign-in with a loopback callback and token refresh
//! - IMAP, SMTP and POP3 adapters behind one [`ProtocolClient`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use wabimail_core::{
//!     Account, AccountManager, AccountType, CoreConfig, CredentialStore, MailClientFactory,
//!     OAuth2Authenticator, SqliteAccountStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> wabimail_core::Result<()> {
//!     let config = CoreConfig::load().await?;
//!     let store = SqliteAccountStore::open(&config.accounts_db_path()).await?;
//!     let accounts = AccountManager::load(Arc::new(store)).await?;
//!
//!     let credentials = Arc::new(CredentialStore::new(config.credentials_dir()));
//!     let auth = Arc::new(OAuth2Authenticator::from_config(credentials, &config)?);
//!     let factory = MailClientFactory::new(auth).with_timeouts(config.network_timeouts());
//!
//!     let account = accounts
//!         .add(Account::new("Personal", "user@gmail.com", AccountType::Gmail))
//!         .await?;
//!     let mut client = factory.create_receive_client(&account).await?;
//!     client.connect().await?;
//!     if let Some(imap) = client.as_imap() {
//!         let batch = imap.fetch_messages("INBOX", 20, false).await?;
//!         println!("{} messages", batch.messages.len());
//!     }
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`account`]: model, validation, persistence and the manager
//! - [`auth`]: credential store and `OAuth2` authenticator
//! - [`config`]: configuration file and defaults
//! - [`service`]: protocol adapters and the client factory

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod auth;
pub mod config;
mod error;
pub mod service;

pub use account::{
    Account, AccountId, AccountManager, AccountSettings, AccountStatistics, AccountStore,
    AccountType, AuthType, MemoryAccountStore, SecurityMode, SqliteAccountStore, ValidationError,
    validate_account,
};
pub use auth::{
    Credential, CredentialProvider, CredentialStore, OAuth2Authenticator, SystemBrowser, UserAgent,
};
pub use config::{CoreConfig, NetworkTimeouts};
pub use error::{Error, Result};
pub use service::{
    CheckOutcome, ClientKind, ConnectionReport, FetchBatch, Folder, FolderKind, ImapAdapter,
    MailClientFactory, Message, MessageId, OutgoingMessage, Pop3Adapter, ProtocolClient,
    SendReport, SmtpAdapter,
};
