//! Connection handling: configuration, transport and the type-state
//! client.

mod client;
mod config;
mod stream;

pub use client::{Authenticated, Client, Connected, Ready};
pub use config::{Config, Security};
pub use stream::SmtpStream;
