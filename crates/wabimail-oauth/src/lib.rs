//! # wabimail-oauth
//!
//! `OAuth2` building blocks for mail accounts (IMAP/SMTP/POP3).
//!
//! ## Features
//!
//! - **Authorization code flow** with PKCE and CSRF state
//! - **Loopback callback listener** bound for exactly one attempt
//! - **Token records** with expiry-margin checks and refresh
//! - **Provider presets** for Gmail, Outlook, Yahoo
//! - **SASL** PLAIN and XOAUTH2 initial responses
//!
//! ## Quick Start
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use wabimail_oauth::{AuthorizationCodeFlow, CallbackListener, OAuthClient, Provider};
//!
//! let provider = Provider::google()?;
//! let client = OAuthClient::new("your_client_id", provider.clone());
//!
//! let listener = CallbackListener::bind(8080..=8090).await?;
//! let flow = AuthorizationCodeFlow::new("your_client_id", provider, listener.redirect_uri());
//! println!("Visit: {}", flow.authorization_url(None)?);
//!
//! let code = listener
//!     .wait_for_code(flow.state(), Duration::from_secs(300), &CancellationToken::new())
//!     .await?;
//! let token = flow.exchange_code(&client, &code).await?;
//! ```
//!
//! ### Token Refresh
//!
//! ```ignore
//! use wabimail_oauth::TokenEndpoint;
//!
//! if token.expires_within(chrono::Duration::minutes(5)) {
//!     let token = client.refresh(&token).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod sasl;
pub mod token;

pub use error::{Error, Result};
pub use flow::{
    AuthorizationCodeFlow, CallbackListener, DEFAULT_PORT_RANGE, OAuthClient, PkceChallenge,
    TokenEndpoint, random_state,
};
pub use provider::Provider;
pub use token::TokenRecord;
