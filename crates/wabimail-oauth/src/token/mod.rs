//! `OAuth2` token records and token endpoint payloads.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An `OAuth2` token set as issued (or refreshed) by the authorization server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Access token string.
    pub access_token: String,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiration time. `None` means the server did not say.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token for obtaining new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scopes granted by the authorization server.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl TokenRecord {
    /// Creates a new bearer token with no expiry information.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at: None,
            refresh_token: None,
            scopes: Vec::new(),
        }
    }

    /// Creates a token record from a token endpoint response.
    ///
    /// # Errors
    ///
    /// Returns an error if the response carries an empty access token.
    pub fn from_response(response: TokenResponse) -> Result<Self> {
        if response.access_token.is_empty() {
            return Err(Error::InvalidResponse("empty access_token".into()));
        }

        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(i64::from(secs)));

        let scopes = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
            refresh_token: response.refresh_token,
            scopes,
        })
    }

    /// Returns true if the token expires within `margin` from now.
    ///
    /// Tokens without an expiry never report as expiring.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() + margin >= exp)
    }

    /// Returns true if the token is already past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiration time.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the granted scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Returns the refresh token if available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`] if none was issued.
    pub fn refresh_token(&self) -> Result<&str> {
        self.refresh_token.as_deref().ok_or(Error::NoRefreshToken)
    }

    /// Folds a refreshed token over the previous one.
    ///
    /// Providers often omit the refresh token and the scope list from a
    /// refresh response; those are carried over from `previous`.
    #[must_use]
    pub fn inherit_from(mut self, previous: &Self) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token.clone_from(&previous.refresh_token);
        }
        if self.scopes.is_empty() {
            self.scopes.clone_from(&previous.scopes);
        }
        self
    }
}

/// Token response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expires in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u32>,
    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Space separated scope list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Error response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
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

    fn response(expires_in: Option<u32>) -> TokenResponse {
        TokenResponse {
            access_token: "ya29.access".to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in,
            refresh_token: Some("1//refresh".to_string()),
            scope: Some("https://mail.google.com/ openid".to_string()),
        }
    }

    #[test]
    fn test_from_response_splits_scopes() {
        let token = TokenRecord::from_response(response(Some(3600))).unwrap();
        assert_eq!(token.access_token, "ya29.access");
        assert_eq!(token.scopes, vec!["https://mail.google.com/", "openid"]);
        assert!(token.expires_at.is_some());
        assert!(!token.is_expired());
    }

    #[test]
    fn test_from_response_rejects_empty_token() {
        let mut resp = response(None);
        resp.access_token = String::new();
        assert!(matches!(
            TokenRecord::from_response(resp),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_missing_token_type_defaults_to_bearer() {
        let resp: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        let token = TokenRecord::from_response(resp).unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn test_expires_within_margin() {
        let soon = TokenRecord::bearer("a").with_expires_at(Utc::now() + Duration::minutes(4));
        assert!(soon.expires_within(Duration::minutes(5)));
        assert!(!soon.is_expired());

        let later = TokenRecord::bearer("a").with_expires_at(Utc::now() + Duration::minutes(30));
        assert!(!later.expires_within(Duration::minutes(5)));

        let past = TokenRecord::bearer("a").with_expires_at(Utc::now() - Duration::seconds(1));
        assert!(past.is_expired());
    }

    #[test]
    fn test_no_expiry_never_expiring() {
        let token = TokenRecord::bearer("a");
        assert!(!token.expires_within(Duration::days(365)));
    }

    #[test]
    fn test_inherit_from_keeps_refresh_token_and_scopes() {
        let previous = TokenRecord::bearer("old")
            .with_refresh_token("keep-me")
            .with_scopes(vec!["mail".to_string()]);
        let refreshed = TokenRecord::bearer("new").inherit_from(&previous);
        assert_eq!(refreshed.access_token, "new");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(refreshed.scopes, vec!["mail"]);

        let rotated = TokenRecord::bearer("new")
            .with_refresh_token("rotated")
            .inherit_from(&previous);
        assert_eq!(rotated.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn test_refresh_token_missing() {
        assert!(matches!(
            TokenRecord::bearer("a").refresh_token(),
            Err(Error::NoRefreshToken)
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = TokenRecord::bearer("secret-access").with_refresh_token("secret-refresh");
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_error_response_into_error() {
        let resp: ErrorResponse =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"Bad"}"#)
                .unwrap();
        assert!(matches!(resp.into_error(), Error::OAuth { error, .. } if error == "invalid_grant"));
    }
}
