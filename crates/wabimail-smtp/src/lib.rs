//! # wabimail-smtp
//!
//! Async SMTP submission client used by the WabiMail send path.
//!
//! ## Features
//!
//! - **Type-state connection**: `Connected` → `Authenticated`
//! - **TLS**: implicit TLS (port 465) and STARTTLS (port 587) via rustls
//! - **Authentication**: PLAIN and XOAUTH2
//! - **Per-recipient results**: refused recipients are reported, not fatal,
//!   unless every recipient is refused
//! - **Extensions**: SIZE, 8BITMIME, SMTPUTF8
//!
//! ## Quick Start
//!
//! ```ignore
//! use wabimail_smtp::{Address, Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> wabimail_smtp::Result<()> {
//!     let client = Client::connect(&Config::new("smtp.example.com")).await?;
//!     let mut client = client.auth_plain("user@example.com", "password").await?;
//!
//!     let from = Address::new("user@example.com")?;
//!     let to = [Address::new("friend@example.org")?];
//!     let delivery = client
//!         .send_mail(&from, &to, b"Subject: Hi\r\n\r\nHello!\r\n")
//!         .await?;
//!     println!("accepted: {}", delivery.accepted.len());
//!
//!     client.quit().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command lines and dot-stuffing
//! - [`connection`]: transport and the type-state client
//! - [`parser`]: reply parser
//! - [`types`]: addresses, replies, capabilities and delivery results

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{Authenticated, Client, Config, Connected, Ready, Security, SmtpStream};
pub use error::{Error, Result};
pub use types::{
    Address, AuthMechanism, Capabilities, Delivery, RejectedRecipient, Reply, ReplyCode,
};
