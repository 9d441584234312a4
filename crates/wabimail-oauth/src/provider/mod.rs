//! `OAuth2` provider configurations.

use crate::error::{Error, Result};
use url::Url;

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Default scopes.
    pub default_scopes: Vec<String>,
    /// Extra query parameters appended to the authorization URL.
    pub extra_auth_params: Vec<(String, String)>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
            extra_auth_params: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Adds an extra authorization URL parameter.
    #[must_use]
    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_auth_params.push((key.into(), value.into()));
        self
    }

    /// Google `OAuth2` provider configuration.
    ///
    /// Requests `https://mail.google.com/` (IMAP/SMTP) and forces an
    /// offline consent so that a refresh token is always issued.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new(
            "Google",
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
        )?
        .with_default_scopes(vec![
            "https://mail.google.com/".to_string(),
            "https://www.googleapis.com/auth/userinfo.email".to_string(),
        ])
        .with_auth_param("access_type", "offline")
        .with_auth_param("prompt", "consent"))
    }

    /// Microsoft/Outlook `OAuth2` provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Ok(Self::new(
            "Microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        )?
        .with_default_scopes(vec![
            "https://outlook.office.com/IMAP.AccessAsUser.All".to_string(),
            "https://outlook.office.com/POP.AccessAsUser.All".to_string(),
            "https://outlook.office.com/SMTP.Send".to_string(),
            "offline_access".to_string(),
        ])
        .with_auth_param("prompt", "consent"))
    }

    /// Yahoo `OAuth2` provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn yahoo() -> Result<Self> {
        Ok(Self::new(
            "Yahoo",
            "https://api.login.yahoo.com/oauth2/request_auth",
            "https://api.login.yahoo.com/oauth2/get_token",
        )?
        .with_default_scopes(vec!["mail-w".to_string(), "mail-r".to_string()]))
    }

    /// Picks a preset from the domain of an email address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the domain has no known preset.
    pub fn for_email(email: &str) -> Result<Self> {
        let domain = email
            .rsplit_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .unwrap_or_default();

        match domain.as_str() {
            "gmail.com" | "googlemail.com" => Self::google(),
            "outlook.com" | "hotmail.com" | "live.com" | "msn.com" => Self::microsoft(),
            "yahoo.com" | "ymail.com" => Self::yahoo(),
            _ => Err(Error::InvalidConfig(format!(
                "no OAuth2 provider known for domain '{domain}'"
            ))),
        }
    }

    /// Validates that required URLs are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoints are not HTTPS (loopback excepted).
    pub fn validate(&self) -> Result<()> {
        for (label, url) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));
            if url.scheme() != "https" && !loopback {
                return Err(Error::InvalidConfig(format!("{label} must use https")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_google_provider() {
        let provider = Provider::google().unwrap();
        assert_eq!(provider.name, "Google");
        assert!(
            provider
                .default_scopes
                .contains(&"https://mail.google.com/".to_string())
        );
        assert!(
            provider
                .extra_auth_params
                .contains(&("access_type".to_string(), "offline".to_string()))
        );
        provider.validate().unwrap();
    }

    #[test]
    fn test_microsoft_provider() {
        let provider = Provider::microsoft().unwrap();
        assert_eq!(provider.name, "Microsoft");
        assert_eq!(provider.default_scopes.len(), 4);
        provider.validate().unwrap();
    }

    #[test]
    fn test_yahoo_provider() {
        let provider = Provider::yahoo().unwrap();
        assert_eq!(provider.default_scopes.len(), 2);
        assert!(provider.extra_auth_params.is_empty());
    }

    #[test]
    fn test_for_email() {
        assert_eq!(Provider::for_email("a@Gmail.com").unwrap().name, "Google");
        assert_eq!(
            Provider::for_email("b@hotmail.com").unwrap().name,
            "Microsoft"
        );
        assert!(Provider::for_email("c@example.org").is_err());
        assert!(Provider::for_email("no-at-sign").is_err());
    }

    #[test]
    fn test_validate_rejects_plain_http() {
        let provider = Provider::new(
            "Custom",
            "http://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap();
        assert!(provider.validate().is_err());

        let local = Provider::new(
            "Local",
            "http://127.0.0.1:9000/authorize",
            "http://localhost:9000/token",
        )
        .unwrap();
        local.validate().unwrap();
    }
}
