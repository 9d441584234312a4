//! Connection handling: configuration, transport and the type-state
//! client.

mod client;
mod config;
mod stream;

pub use client::{Authorization, Client, Transaction};
pub use config::{Config, Security};
pub use stream::Pop3Stream;
