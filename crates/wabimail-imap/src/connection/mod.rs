//! Connection handling: configuration, transport, framing and the
//! type-state client.

mod client;
mod config;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected, Session};
pub use config::{Config, Security};
pub use framed::FramedStream;
pub use stream::{ImapStream, tls_connector};
