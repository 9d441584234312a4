//! SASL initial responses shared by the IMAP, SMTP and POP3 clients.
//!
//! - PLAIN (RFC 4616) for password and app-password accounts
//! - XOAUTH2 (Google/Microsoft) for `OAuth2` accounts

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded). The authorization
/// identity is left empty so the server uses the authentication identity.
///
/// # Example
///
/// ```
/// use wabimail_oauth::sasl::plain_response;
///
/// let response = plain_response("user@example.com", "password123");
/// assert_eq!(response, "AHVzZXJAZXhhbXBsZS5jb20AcGFzc3dvcmQxMjM=");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01` (base64 encoded)
///
/// # Example
///
/// ```
/// use wabimail_oauth::sasl::xoauth2_response;
///
/// let response = xoauth2_response("user@example.com", "ya29.a0");
/// assert!(!response.contains("ya29"));
/// ```
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Error details a server sends as an XOAUTH2 challenge when it refuses
/// the bearer token, e.g. `{"status":"401","schemes":"bearer","scope":"..."}`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct XOAuth2Failure {
    /// HTTP-like status code.
    pub status: String,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: String,
    /// Scope required.
    #[serde(default)]
    pub scope: Option<String>,
}

impl XOAuth2Failure {
    /// Returns true when the server says the token itself is unusable.
    #[must_use]
    pub fn is_invalid_token(&self) -> bool {
        self.status == "400" || self.status == "401"
    }
}

/// Decodes the base64 JSON challenge sent after a rejected XOAUTH2 response.
///
/// Returns `None` if the challenge is not base64 JSON.
#[must_use]
pub fn decode_xoauth2_challenge(challenge: &str) -> Option<XOAuth2Failure> {
    let bytes = STANDARD.decode(challenge.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
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
    fn test_xoauth2_format() {
        let response = xoauth2_response("test@test.com", "abc");
        let decoded = STANDARD.decode(&response).unwrap();
        let decoded_str = String::from_utf8(decoded).unwrap();
        assert_eq!(decoded_str, "user=test@test.com\x01auth=Bearer abc\x01\x01");
    }

    #[test]
    fn test_plain_response_format() {
        let response = plain_response("test", "pass");
        let decoded = STANDARD.decode(&response).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "\0test\0pass");
    }

    #[test]
    fn test_plain_response_special_chars() {
        let response = plain_response("user", "pass@word!");
        let decoded = STANDARD.decode(&response).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "\0user\0pass@word!");
    }

    #[test]
    fn test_decode_challenge() {
        let json = r#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#;
        let challenge = STANDARD.encode(json);
        let failure = decode_xoauth2_challenge(&challenge).unwrap();
        assert_eq!(failure.status, "401");
        assert!(failure.is_invalid_token());
        assert_eq!(failure.scope.as_deref(), Some("https://mail.google.com/"));
    }

    #[test]
    fn test_decode_challenge_garbage() {
        assert!(decode_xoauth2_challenge("not base64 !!").is_none());
        assert!(decode_xoauth2_challenge(&STANDARD.encode("plain text")).is_none());
    }
}
