//! `OAuth2` authorization flows.

mod callback;
mod code;
mod pkce;

pub use callback::{CallbackListener, DEFAULT_PORT_RANGE};
pub use code::AuthorizationCodeFlow;
pub use pkce::{PkceChallenge, random_state};

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, TokenRecord, TokenResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// The token endpoint operations an authenticator needs.
///
/// [`OAuthClient`] is the HTTP implementation; tests substitute their own.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges an authorization code for a token set.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenRecord>;

    /// Obtains a fresh access token with the refresh token of `token`.
    async fn refresh(&self, token: &TokenRecord) -> Result<TokenRecord>;
}

/// Common `OAuth2` client configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Redirect URI for authorization code flow.
    pub redirect_uri: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Bounds every token endpoint request by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    async fn post_form(&self, params: &HashMap<&str, &str>) -> Result<TokenRecord> {
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(%status, "token endpoint returned an error");
            return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| Error::InvalidResponse(format!("HTTP {status}")),
                ErrorResponse::into_error,
            ));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)?;
        TokenRecord::from_response(token_response)
    }
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenRecord> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", self.client_id.as_str());
        params.insert("redirect_uri", redirect_uri);

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        if let Some(verifier) = code_verifier {
            params.insert("code_verifier", verifier);
        }

        debug!(provider = %self.provider.name, "exchanging authorization code");
        self.post_form(&params).await
    }

    async fn refresh(&self, token: &TokenRecord) -> Result<TokenRecord> {
        let refresh_token = token.refresh_token()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", self.client_id.as_str());

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        debug!(provider = %self.provider.name, "refreshing access token");
        let refreshed = self.post_form(&params).await?;
        Ok(refreshed.inherit_from(token))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one HTTP response and returns the raw request it received.
    async fn one_shot_server(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (url, handle)
    }

    fn client_for(token_url: &str) -> OAuthClient {
        let provider =
            Provider::new("Test", "http://127.0.0.1/authorize", token_url).unwrap();
        OAuthClient::new("client-123", provider).with_client_secret("s3cret")
    }

    #[test]
    fn test_oauth_client_creation() {
        let provider = Provider::google().unwrap();
        let client = OAuthClient::new("test_client_id", provider)
            .with_client_secret("secret")
            .with_redirect_uri("http://localhost:8080");
        assert_eq!(client.client_id, "test_client_id");
        assert_eq!(client.client_secret.as_deref(), Some("secret"));
        assert_eq!(
            client.redirect_uri.as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let (url, server) = one_shot_server(
            "200 OK",
            r#"{"access_token":"at","token_type":"Bearer","expires_in":3600,"refresh_token":"rt","scope":"mail"}"#,
        )
        .await;

        let token = client_for(&url)
            .exchange_code("the-code", "http://localhost:8080/", Some("verifier"))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert!(request.starts_with("POST /token"));
        assert!(request.contains("grant_type=authorization_code"));
        assert!(request.contains("code=the-code"));
        assert!(request.contains("code_verifier=verifier"));
        assert!(request.contains("client_secret=s3cret"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token() {
        let (url, server) = one_shot_server(
            "200 OK",
            r#"{"access_token":"new","token_type":"Bearer","expires_in":3600}"#,
        )
        .await;

        let old = TokenRecord::bearer("old").with_refresh_token("rt-1");
        let token = client_for(&url).refresh(&old).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("rt-1"));
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("refresh_token=rt-1"));
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant() {
        let (url, server) = one_shot_server(
            "400 Bad Request",
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        )
        .await;

        let old = TokenRecord::bearer("old").with_refresh_token("revoked");
        let err = client_for(&url).refresh(&old).await.unwrap_err();
        server.await.unwrap();

        assert!(err.is_grant_rejected());
        assert!(matches!(err, Error::OAuth { error, .. } if error == "invalid_grant"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_skips_network() {
        let client = client_for("http://127.0.0.1:9/token");
        let err = client.refresh(&TokenRecord::bearer("a")).await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let (url, server) = one_shot_server("502 Bad Gateway", "upstream down").await;
        let old = TokenRecord::bearer("old").with_refresh_token("rt");
        let err = client_for(&url).refresh(&old).await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, Error::InvalidResponse(msg) if msg.contains("502")));
    }
}
