//! Authorization Code Flow implementation.

use super::{PkceChallenge, TokenEndpoint, random_state};
use crate::error::Result;
use crate::provider::Provider;
use crate::token::TokenRecord;
use url::Url;

/// One attempt of the `OAuth2` authorization code flow.
///
/// Each attempt carries its own PKCE pair and CSRF `state`; build a new
/// flow for every authorization attempt.
#[derive(Debug)]
pub struct AuthorizationCodeFlow {
    client_id: String,
    provider: Provider,
    redirect_uri: String,
    pkce: PkceChallenge,
    state: String,
}

impl AuthorizationCodeFlow {
    /// Creates a new flow with a fresh PKCE challenge and state.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        provider: Provider,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            provider,
            redirect_uri: redirect_uri.into(),
            pkce: PkceChallenge::generate(),
            state: random_state(),
        }
    }

    /// Builds the authorization URL for user consent.
    ///
    /// # Arguments
    ///
    /// * `scopes` - Optional scopes to request (uses provider defaults if None)
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be constructed.
    pub fn authorization_url(&self, scopes: Option<&[String]>) -> Result<Url> {
        let mut url = self.provider.auth_url.clone();

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("state", &self.state)
                .append_pair("code_challenge", self.pkce.challenge())
                .append_pair("code_challenge_method", self.pkce.method());

            let scope_str = scopes.map_or_else(
                || self.provider.default_scopes.join(" "),
                |s| s.join(" "),
            );

            if !scope_str.is_empty() {
                pairs.append_pair("scope", &scope_str);
            }

            for (key, value) in &self.provider.extra_auth_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Exchanges the authorization code through `endpoint`, sending the
    /// PKCE verifier and the redirect URI used for this attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub async fn exchange_code(
        &self,
        endpoint: &dyn TokenEndpoint,
        code: &str,
    ) -> Result<TokenRecord> {
        endpoint
            .exchange_code(code, &self.redirect_uri, Some(self.pkce.verifier()))
            .await
    }

    /// Returns the CSRF state sent with the authorization request.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns the redirect URI of this attempt.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the PKCE verifier.
    #[must_use]
    pub fn pkce_verifier(&self) -> &str {
        self.pkce.verifier()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn flow() -> AuthorizationCodeFlow {
        AuthorizationCodeFlow::new(
            "test_client",
            Provider::google().unwrap(),
            "http://localhost:8080/",
        )
    }

    #[test]
    fn test_authorization_url() {
        let flow = flow();
        let url = flow.authorization_url(None).unwrap();

        assert!(url.as_str().contains("client_id=test_client"));
        assert!(url.as_str().contains("response_type=code"));
        assert!(url.as_str().contains(&format!("state={}", flow.state())));
        assert!(
            url.as_str()
                .contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2F")
        );
        assert!(url.as_str().contains("code_challenge="));
        assert!(url.as_str().contains("code_challenge_method=S256"));
    }

    #[test]
    fn test_authorization_url_custom_scopes() {
        let scopes = vec!["email".to_string(), "profile".to_string()];
        let url = flow().authorization_url(Some(&scopes)).unwrap();
        assert!(url.as_str().contains("scope=email+profile"));
    }

    #[test]
    fn test_google_specific_params() {
        let url = flow().authorization_url(None).unwrap();
        assert!(url.as_str().contains("access_type=offline"));
        assert!(url.as_str().contains("prompt=consent"));
    }

    #[test]
    fn test_each_attempt_has_fresh_state() {
        let a = flow();
        let b = flow();
        assert_ne!(a.state(), b.state());
        assert_ne!(a.pkce_verifier(), b.pkce_verifier());
    }
}
