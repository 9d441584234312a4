//! Application configuration.
//!
//! Stored as JSON at `<config_dir>/wabimail/config.json`. Every field has
//! a default, so a missing file or a partial file is fine.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "WABIMAIL_LOG";

const APP_DIR: &str = "wabimail";

/// OAuth2 client registration for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    /// Client id issued by the provider.
    pub client_id: String,
    /// Client secret, for providers that require one from desktop apps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// OAuth2 clients per provider. Providers without a client cannot use the
/// authorization-code flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Google (Gmail).
    pub google: Option<OAuthClientConfig>,
    /// Microsoft (Outlook.com).
    pub microsoft: Option<OAuthClientConfig>,
    /// Yahoo.
    pub yahoo: Option<OAuthClientConfig>,
}

impl OAuthConfig {
    /// Client for a provider preset name as used by `wabimail_oauth`
    /// (`Google`, `Microsoft`, `Yahoo`).
    #[must_use]
    pub fn client_for(&self, provider: &str) -> Option<&OAuthClientConfig> {
        match provider.to_ascii_lowercase().as_str() {
            "google" => self.google.as_ref(),
            "microsoft" => self.microsoft.as_ref(),
            "yahoo" => self.yahoo.as_ref(),
            _ => None,
        }
    }
}

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Where accounts and credentials live; defaults to
    /// `<data_dir>/wabimail`.
    pub data_dir: Option<PathBuf>,
    /// OAuth2 client registrations.
    pub oauth: OAuthConfig,
    /// First port tried for the OAuth2 callback listener.
    pub callback_port_start: u16,
    /// Last port tried for the OAuth2 callback listener.
    pub callback_port_end: u16,
    /// How long to wait for the browser to come back, in seconds.
    pub auth_timeout_secs: u64,
    /// Tokens expiring within this many seconds are refreshed first.
    pub refresh_margin_secs: u64,
    /// TCP connect and TLS handshake limit, in seconds.
    pub connect_timeout_secs: u64,
    /// Per-command limit, in seconds.
    pub io_timeout_secs: u64,
    /// `tracing` filter directive.
    pub log_filter: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            oauth: OAuthConfig::default(),
            callback_port_start: 8080,
            callback_port_end: 8090,
            auth_timeout_secs: 300,
            refresh_margin_secs: 300,
            connect_timeout_secs: 30,
            io_timeout_secs: 30,
            log_filter: "wabimail=info,wabimail_core=info".to_string(),
        }
    }
}

impl CoreConfig {
    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Loads the config from [`default_path`](Self::default_path).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or
    /// parsed.
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()).await
    }

    /// Loads the config from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Config(format!("{}: {e}", path.display()))),
        };
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Config(format!("{}: {e}", parent.display())))?;
        }
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Rejects values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.callback_port_start > self.callback_port_end {
            return Err(Error::Config(format!(
                "callback port range {}..={} is empty",
                self.callback_port_start, self.callback_port_end
            )));
        }
        if self.auth_timeout_secs == 0 || self.connect_timeout_secs == 0 || self.io_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least one second".into()));
        }
        Ok(())
    }

    /// Resolved data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    /// `SQLite` database holding the account set.
    #[must_use]
    pub fn accounts_db_path(&self) -> PathBuf {
        self.data_dir().join("accounts.db")
    }

    /// Directory of encrypted credential records.
    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.data_dir().join("credentials")
    }

    /// Ports tried for the OAuth2 callback listener.
    #[must_use]
    pub const fn callback_ports(&self) -> RangeInclusive<u16> {
        self.callback_port_start..=self.callback_port_end
    }

    /// Browser round trip limit.
    #[must_use]
    pub const fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// Proactive refresh margin.
    #[must_use]
    pub const fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    /// Connect and per-command timeouts.
    #[must_use]
    pub const fn network_timeouts(&self) -> NetworkTimeouts {
        NetworkTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            io: Duration::from_secs(self.io_timeout_secs),
        }
    }

    /// Log filter: `WABIMAIL_LOG`, then `RUST_LOG`, then the configured
    /// value.
    #[must_use]
    pub fn log_filter(&self) -> String {
        [LOG_ENV, "RUST_LOG"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| self.log_filter.clone())
    }
}

/// Timeouts handed to the protocol clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTimeouts {
    /// TCP connect and TLS handshake.
    pub connect: Duration,
    /// Each command round trip.
    pub io: Duration,
}

impl Default for NetworkTimeouts {
    fn default() -> Self {
        CoreConfig::default().network_timeouts()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::load_from(&dir.path().join("nope.json"))
            .await
            .unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.callback_ports(), 8080..=8090);
        assert_eq!(config.auth_timeout(), Duration::from_secs(300));
        assert_eq!(config.refresh_margin(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"io_timeout_secs": 10, "oauth": {"google": {"client_id": "abc"}}}"#,
        )
        .await
        .unwrap();

        let config = CoreConfig::load_from(&path).await.unwrap();
        assert_eq!(config.io_timeout_secs, 10);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.oauth.client_for("Google").unwrap().client_id, "abc");
        assert!(config.oauth.client_for("Microsoft").is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = CoreConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..CoreConfig::default()
        };
        config.save_to(&path).await.unwrap();
        assert_eq!(CoreConfig::load_from(&path).await.unwrap(), config);
        assert_eq!(config.credentials_dir(), dir.path().join("credentials"));
        assert_eq!(config.accounts_db_path(), dir.path().join("accounts.db"));
    }

    #[tokio::test]
    async fn test_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"callback_port_start": 9000, "callback_port_end": 8000}"#)
            .await
            .unwrap();
        assert!(matches!(CoreConfig::load_from(&path).await, Err(Error::Config(_))));

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(CoreConfig::load_from(&path).await, Err(Error::Config(_))));
    }
}
