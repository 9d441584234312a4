//! # wabimail-pop3
//!
//! Async POP3 client for WabiMail receive-only accounts.
//!
//! ## Features
//!
//! - **Type-state connection**: `Authorization` → `Transaction`
//! - **TLS**: implicit TLS (port 995) and STLS (port 110) via rustls
//! - **Authentication**: USER/PASS and `AUTH XOAUTH2`
//! - **Maildrop commands**: STAT, LIST, UIDL, RETR, TOP, DELE, RSET
//!
//! Messages marked with DELE are only removed when the session ends with
//! QUIT; dropping the connection leaves the maildrop untouched.
//!
//! ## Quick Start
//!
//! ```ignore
//! use wabimail_pop3::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> wabimail_pop3::Result<()> {
//!     let client = Client::connect(&Config::new("pop.example.com")).await?;
//!     let mut client = client.login("user@example.com", "password").await?;
//!
//!     for entry in client.uidl().await? {
//!         let raw = client.retr(entry.number).await?;
//!         println!("{}: {} bytes", entry.uid, raw.len());
//!     }
//!
//!     client.quit().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command lines
//! - [`connection`]: transport and the type-state client
//! - [`parser`]: status lines, listings and dot-unstuffing
//! - [`types`]: maildrop listings

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{Authorization, Client, Config, Pop3Stream, Security, Transaction};
pub use error::{Error, Result};
pub use types::{ListEntry, Stat, UidlEntry};
