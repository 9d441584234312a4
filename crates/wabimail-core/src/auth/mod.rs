//! Credentials and `OAuth2` sign-in.

mod authenticator;
mod credentials;
mod locks;

pub use authenticator::{CredentialProvider, OAuth2Authenticator, SystemBrowser, UserAgent};
pub use credentials::{Credential, CredentialStore};
