//! Account model types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account: a UUID v4 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of mail service; decides which protocol clients an account gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Gmail over IMAP and SMTP with OAuth2.
    Gmail,
    /// Generic IMAP server.
    #[default]
    Imap,
    /// Send-only SMTP server.
    Smtp,
    /// POP3 server.
    Pop3,
    /// Microsoft Exchange; no receive protocol is implemented.
    Exchange,
}

impl AccountType {
    /// Every account type, in display order.
    pub const ALL: [Self; 5] = [Self::Gmail, Self::Imap, Self::Smtp, Self::Pop3, Self::Exchange];

    /// Lowercase name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Imap => "imap",
            Self::Smtp => "smtp",
            Self::Pop3 => "pop3",
            Self::Exchange => "exchange",
        }
    }

    /// Authentication normally used with this type.
    #[must_use]
    pub const fn default_auth(self) -> AuthType {
        match self {
            Self::Gmail => AuthType::OAuth2,
            _ => AuthType::Password,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown account type '{s}'"))
    }
}

/// How the account proves its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Username and password.
    #[default]
    Password,
    /// `OAuth2` bearer token.
    #[serde(rename = "oauth2")]
    OAuth2,
    /// Provider-issued application password.
    AppPassword,
    /// No authentication (test servers).
    None,
}

impl AuthType {
    /// Lowercase name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::OAuth2 => "oauth2",
            Self::AppPassword => "app_password",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "password" => Ok(Self::Password),
            "oauth2" | "oauth" => Ok(Self::OAuth2),
            "app_password" => Ok(Self::AppPassword),
            "none" => Ok(Self::None),
            other => Err(format!("unknown auth type '{other}'")),
        }
    }
}

/// Transport security for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecurityMode {
    /// Plain TCP (not recommended).
    #[serde(rename = "none", alias = "NONE")]
    None,
    /// Implicit TLS from the first byte.
    #[default]
    #[serde(rename = "SSL", alias = "ssl", alias = "TLS", alias = "tls")]
    Ssl,
    /// Plain connect, then STARTTLS (IMAP/SMTP) or STLS (POP3).
    #[serde(rename = "STARTTLS", alias = "starttls")]
    StartTls,
}

impl SecurityMode {
    /// Name for display.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Ssl => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

impl FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "plain" => Ok(Self::None),
            "ssl" | "tls" => Ok(Self::Ssl),
            "starttls" | "stls" => Ok(Self::StartTls),
            other => Err(format!("unknown security mode '{other}'")),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Incoming and outgoing server settings.
///
/// Ports are `u32` so that out-of-range input survives until validation
/// reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    /// IMAP or POP3 host.
    #[serde(default)]
    pub incoming_server: String,
    /// IMAP or POP3 port.
    pub incoming_port: u32,
    /// IMAP or POP3 security.
    pub incoming_security: SecurityMode,
    /// SMTP host.
    #[serde(default)]
    pub outgoing_server: String,
    /// SMTP port.
    pub outgoing_port: u32,
    /// SMTP security.
    pub outgoing_security: SecurityMode,
    /// Login name when it differs from the email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Whether SMTP submission authenticates.
    #[serde(default = "default_true")]
    pub requires_auth: bool,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            incoming_server: String::new(),
            incoming_port: 993,
            incoming_security: SecurityMode::Ssl,
            outgoing_server: String::new(),
            outgoing_port: 587,
            outgoing_security: SecurityMode::StartTls,
            username: None,
            requires_auth: true,
        }
    }
}

impl AccountSettings {
    /// Defaults for a new account of `account_type`; hosts are filled in
    /// only for providers with a preset.
    #[must_use]
    pub fn defaults_for(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Gmail => Self::gmail(),
            AccountType::Pop3 => Self {
                incoming_port: 995,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Gmail: `imap.gmail.com:993` over SSL, `smtp.gmail.com:587` with
    /// STARTTLS.
    #[must_use]
    pub fn gmail() -> Self {
        Self {
            incoming_server: "imap.gmail.com".to_string(),
            incoming_port: 993,
            incoming_security: SecurityMode::Ssl,
            outgoing_server: "smtp.gmail.com".to_string(),
            outgoing_port: 587,
            outgoing_security: SecurityMode::StartTls,
            username: None,
            requires_auth: true,
        }
    }
}

/// A configured mail account.
///
/// Secrets never live here; they are kept by the credential store under
/// the account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Label shown to the user (e.g. "Work Gmail").
    pub name: String,
    /// Email address.
    pub email: String,
    /// Service kind.
    pub account_type: AccountType,
    /// Authentication method.
    pub auth_type: AuthType,
    /// Server settings.
    pub settings: AccountSettings,
    /// Inactive accounts are kept but not synced.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Exactly one account of a non-empty set is the default.
    #[serde(default)]
    pub is_default: bool,
    /// When the account was added.
    pub created_at: DateTime<Utc>,
    /// Last successful fetch.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Whether automatic sync is enabled.
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    /// Appended to outgoing text bodies after `-- `.
    #[serde(default)]
    pub signature: String,
    /// Sender display name.
    #[serde(default)]
    pub display_name: String,
}

impl Account {
    /// Creates an account with the defaults for `account_type`.
    ///
    /// The display name defaults to the local part of the address.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, account_type: AccountType) -> Self {
        let email = email.into();
        let display_name = email.split('@').next().unwrap_or_default().to_string();
        Self {
            id: AccountId::generate(),
            name: name.into(),
            email,
            account_type,
            auth_type: account_type.default_auth(),
            settings: AccountSettings::defaults_for(account_type),
            is_active: true,
            is_default: false,
            created_at: Utc::now(),
            last_sync: None,
            sync_enabled: true,
            signature: String::new(),
            display_name,
        }
    }

    /// Sets the authentication method.
    #[must_use]
    pub const fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    /// Replaces the server settings.
    #[must_use]
    pub fn with_settings(mut self, settings: AccountSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Sets the sender display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Login name: the settings override or the email address.
    #[must_use]
    pub fn username(&self) -> &str {
        self.settings
            .username
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.email)
    }

    /// Fills empty Gmail hosts from the preset. Other types are left as
    /// they are.
    pub fn apply_preset(&mut self) {
        if self.account_type != AccountType::Gmail {
            return;
        }
        let preset = AccountSettings::gmail();
        let settings = &mut self.settings;
        if settings.incoming_server.trim().is_empty() {
            settings.incoming_server = preset.incoming_server;
            settings.incoming_port = preset.incoming_port;
            settings.incoming_security = preset.incoming_security;
        }
        if settings.outgoing_server.trim().is_empty() {
            settings.outgoing_server = preset.outgoing_server;
            settings.outgoing_port = preset.outgoing_port;
            settings.outgoing_security = preset.outgoing_security;
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> ({})", self.name, self.email, self.account_type)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_defaults() {
        let account = Account::new("Work", "taro@example.com", AccountType::Imap);
        assert_eq!(account.display_name, "taro");
        assert_eq!(account.auth_type, AuthType::Password);
        assert_eq!(account.settings.incoming_port, 993);
        assert_eq!(account.settings.outgoing_security, SecurityMode::StartTls);
        assert!(account.is_active);
        assert!(!account.is_default);
        assert_eq!(account.username(), "taro@example.com");
        assert!(uuid::Uuid::parse_str(account.id.as_str()).is_ok());
    }

    #[test]
    fn test_gmail_account_uses_oauth_and_preset() {
        let account = Account::new("Gmail", "user@gmail.com", AccountType::Gmail);
        assert_eq!(account.auth_type, AuthType::OAuth2);
        assert_eq!(account.settings.incoming_server, "imap.gmail.com");
        assert_eq!(account.settings.outgoing_server, "smtp.gmail.com");
        assert_eq!(account.settings.outgoing_port, 587);
    }

    #[test]
    fn test_apply_preset_fills_only_empty_hosts() {
        let mut account = Account::new("Gmail", "user@gmail.com", AccountType::Gmail);
        account.settings.incoming_server.clear();
        account.settings.outgoing_server = "relay.example.com".into();
        account.settings.outgoing_port = 2525;
        account.apply_preset();
        assert_eq!(account.settings.incoming_server, "imap.gmail.com");
        assert_eq!(account.settings.outgoing_server, "relay.example.com");
        assert_eq!(account.settings.outgoing_port, 2525);

        let mut imap = Account::new("x", "x@example.com", AccountType::Imap);
        imap.apply_preset();
        assert!(imap.settings.incoming_server.is_empty());
    }

    #[test]
    fn test_pop3_defaults_to_995() {
        let account = Account::new("Pop", "me@example.com", AccountType::Pop3);
        assert_eq!(account.settings.incoming_port, 995);
        assert_eq!(account.settings.incoming_security, SecurityMode::Ssl);
    }

    #[test]
    fn test_username_override() {
        let mut account = Account::new("x", "me@example.com", AccountType::Imap);
        account.settings.username = Some("me".into());
        assert_eq!(account.username(), "me");
        account.settings.username = Some("  ".into());
        assert_eq!(account.username(), "me@example.com");
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("POP3".parse::<AccountType>().unwrap(), AccountType::Pop3);
        assert!("carrier-pigeon".parse::<AccountType>().is_err());
        assert_eq!("app-password".parse::<AuthType>().unwrap(), AuthType::AppPassword);
        assert_eq!("tls".parse::<SecurityMode>().unwrap(), SecurityMode::Ssl);
        assert_eq!("STARTTLS".parse::<SecurityMode>().unwrap(), SecurityMode::StartTls);
    }

    #[test]
    fn test_serialized_names() {
        let account = Account::new("Gmail", "user@gmail.com", AccountType::Gmail);
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["account_type"], "gmail");
        assert_eq!(json["auth_type"], "oauth2");
        assert_eq!(json["settings"]["incoming_security"], "SSL");
        assert_eq!(json["settings"]["outgoing_security"], "STARTTLS");

        let back: Account = serde_json::from_value(json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_settings_accept_legacy_security_names() {
        let settings: AccountSettings = serde_json::from_str(
            r#"{"incoming_port": 143, "incoming_security": "TLS",
                "outgoing_port": 25, "outgoing_security": "NONE"}"#,
        )
        .unwrap();
        assert_eq!(settings.incoming_security, SecurityMode::Ssl);
        assert_eq!(settings.outgoing_security, SecurityMode::None);
        assert!(settings.requires_auth);
    }
}
