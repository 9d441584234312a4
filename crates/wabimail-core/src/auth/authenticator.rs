//! `OAuth2` sign-in and token upkeep for mail accounts.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wabimail_oauth::{
    AuthorizationCodeFlow, CallbackListener, OAuthClient, Provider, TokenEndpoint,
};

use super::credentials::{Credential, CredentialStore};
use super::locks::AccountLocks;
use crate::account::{Account, AccountId, AccountType, AuthType};
use crate::config::CoreConfig;
use crate::{Error, Result};

/// Shows the consent page to the user.
pub trait UserAgent: Send + Sync {
    /// Opens `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing could be launched; the flow keeps
    /// waiting so the user can open the URL by hand.
    fn open(&self, url: &str) -> Result<()>;
}

/// The desktop's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl UserAgent for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        opener::open(url).map_err(|e| Error::Config(format!("cannot open browser: {e}")))
    }
}

/// Supplies a usable credential for an account.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns a credential ready to present to the server.
    async fn credential(&self, account: &Account) -> Result<Credential>;
}

struct Registration {
    provider: Provider,
    client_id: String,
    endpoint: Arc<dyn TokenEndpoint>,
}

/// Runs the browser sign-in and keeps access tokens fresh.
pub struct OAuth2Authenticator {
    store: Arc<CredentialStore>,
    registrations: HashMap<String, Registration>,
    user_agent: Arc<dyn UserAgent>,
    ports: RangeInclusive<u16>,
    flow_timeout: Duration,
    refresh_margin: Duration,
    refresh_locks: AccountLocks,
}

impl std::fmt::Debug for OAuth2Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.registrations.keys().collect();
        providers.sort();
        f.debug_struct("OAuth2Authenticator")
            .field("store", &self.store.dir())
            .field("providers", &providers)
            .field("ports", &self.ports)
            .field("flow_timeout", &self.flow_timeout)
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

impl OAuth2Authenticator {
    /// Creates an authenticator with no providers, the system browser,
    /// ports 8080-8090, a 300 s flow timeout and a 5 minute refresh margin.
    #[must_use]
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            registrations: HashMap::new(),
            user_agent: Arc::new(SystemBrowser),
            ports: 8080..=8090,
            flow_timeout: Duration::from_secs(300),
            refresh_margin: Duration::from_secs(300),
            refresh_locks: AccountLocks::default(),
        }
    }

    /// Creates an authenticator from the configured clients and limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a provider preset or HTTP client cannot
    /// be built.
    pub fn from_config(store: Arc<CredentialStore>, config: &CoreConfig) -> Result<Self> {
        let mut authenticator = Self::new(store)
            .with_port_range(config.callback_ports())
            .with_flow_timeout(config.auth_timeout())
            .with_refresh_margin(config.refresh_margin());

        let presets = [
            (Provider::google()?, config.oauth.google.as_ref()),
            (Provider::microsoft()?, config.oauth.microsoft.as_ref()),
            (Provider::yahoo()?, config.oauth.yahoo.as_ref()),
        ];
        for (provider, client) in presets {
            let Some(client) = client.filter(|c| !c.client_id.trim().is_empty()) else {
                continue;
            };
            let mut endpoint = OAuthClient::new(&client.client_id, provider.clone())
                .with_timeout(config.network_timeouts().io)?;
            if let Some(secret) = &client.client_secret {
                endpoint = endpoint.with_client_secret(secret);
            }
            authenticator =
                authenticator.with_provider(provider, &client.client_id, Arc::new(endpoint));
        }
        Ok(authenticator)
    }

    /// Registers the client and token endpoint used for `provider`.
    #[must_use]
    pub fn with_provider(
        mut self,
        provider: Provider,
        client_id: impl Into<String>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        debug!(provider = %provider.name, "OAuth2 provider registered");
        self.registrations.insert(
            provider.name.to_ascii_lowercase(),
            Registration {
                provider,
                client_id: client_id.into(),
                endpoint,
            },
        );
        self
    }

    /// Replaces the user agent that opens the consent page.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Arc<dyn UserAgent>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Sets the ports tried for the callback listener.
    #[must_use]
    pub const fn with_port_range(mut self, ports: RangeInclusive<u16>) -> Self {
        self.ports = ports;
        self
    }

    /// Sets how long to wait for the browser to come back.
    #[must_use]
    pub const fn with_flow_timeout(mut self, timeout: Duration) -> Self {
        self.flow_timeout = timeout;
        self
    }

    /// Tokens expiring within `margin` are refreshed before use.
    #[must_use]
    pub const fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// The underlying credential store.
    #[must_use]
    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Signs `account` in through the browser and stores the token set.
    ///
    /// The callback listener is released on every exit path.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no client is registered for the provider
    /// - [`Error::AuthTimeout`] / [`Error::AuthCancelled`]
    /// - [`Error::Auth`] if consent is denied or the state does not match
    /// - [`Error::Connection`] if no callback port is free or the token
    ///   endpoint is unreachable
    pub async fn begin_auth_flow(
        &self,
        account: &Account,
        cancel: &CancellationToken,
    ) -> Result<Credential> {
        let registration = self.registration_for(account)?;
        let listener = CallbackListener::bind(self.ports.clone()).await?;
        let flow = AuthorizationCodeFlow::new(
            &registration.client_id,
            registration.provider.clone(),
            listener.redirect_uri(),
        );
        let url = flow.authorization_url(None)?;

        info!(
            account = %account.id,
            provider = %registration.provider.name,
            port = listener.port(),
            "waiting for browser authorization"
        );
        if let Err(e) = self.user_agent.open(url.as_str()) {
            warn!(error = %e, %url, "could not open the consent page, open it manually");
        }

        let code = listener
            .wait_for_code(flow.state(), self.flow_timeout, cancel)
            .await?;
        let token = flow
            .exchange_code(registration.endpoint.as_ref(), &code)
            .await?;

        let credential = Credential::OAuth2(token);
        self.store.save(&account.id, &credential).await?;
        info!(account = %account.id, "account authorized");
        Ok(credential)
    }

    /// Returns a credential that can be presented now.
    ///
    /// Passwords come back as stored. Tokens within the refresh margin are
    /// refreshed first; a token without an expiry is used as is.
    ///
    /// # Errors
    ///
    /// - [`Error::ReauthRequired`] if nothing is stored, no refresh token
    ///   is available or the provider rejected it; the stale credential is
    ///   deleted
    /// - [`Error::Connection`] if the token endpoint is unreachable; the
    ///   credential is kept
    pub async fn get_valid_credential(&self, account: &Account) -> Result<Credential> {
        let _guard = self.refresh_locks.lock(account.id.as_str()).await;

        let token = match self.store.load(&account.id).await {
            Ok(Credential::OAuth2(token)) => token,
            Ok(credential) => return Ok(credential),
            Err(Error::NotFound(_)) => return Err(Error::ReauthRequired(account.email.clone())),
            Err(e) => return Err(e),
        };

        let margin = chrono::Duration::from_std(self.refresh_margin)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        if !token.expires_within(margin) {
            return Ok(Credential::OAuth2(token));
        }

        if token.refresh_token.is_none() {
            warn!(account = %account.id, "token expiring and no refresh token stored");
            self.store.delete(&account.id).await?;
            return Err(Error::ReauthRequired(account.email.clone()));
        }

        let registration = self.registration_for(account)?;
        debug!(account = %account.id, "refreshing access token");
        match registration.endpoint.refresh(&token).await {
            Ok(fresh) => {
                let credential = Credential::OAuth2(fresh.inherit_from(&token));
                self.store.save(&account.id, &credential).await?;
                info!(account = %account.id, "access token refreshed");
                Ok(credential)
            }
            Err(e) if e.is_grant_rejected() => {
                warn!(account = %account.id, error = %e, "refresh rejected, sign-in required");
                self.store.delete(&account.id).await?;
                Err(Error::ReauthRequired(account.email.clone()))
            }
            Err(e) => {
                warn!(account = %account.id, error = %e, "token refresh failed");
                Err(e.into())
            }
        }
    }

    /// Deletes the stored credential of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub async fn sign_out(&self, id: &AccountId) -> Result<()> {
        self.store.delete(id).await?;
        info!(account = %id, "signed out");
        Ok(())
    }

    /// Stores a password for a password or app-password account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for `OAuth2` accounts and storage
    /// errors otherwise.
    pub async fn store_password(&self, account: &Account, secret: impl Into<String>) -> Result<()> {
        let credential = match account.auth_type {
            AuthType::Password => Credential::Password(secret.into()),
            AuthType::AppPassword => Credential::AppPassword(secret.into()),
            AuthType::OAuth2 => {
                return Err(Error::Unsupported(
                    "OAuth2 accounts sign in through the browser".into(),
                ));
            }
            AuthType::None => {
                return Err(Error::Unsupported(
                    "account does not use authentication".into(),
                ));
            }
        };
        self.store.save(&account.id, &credential).await?;
        info!(account = %account.id, kind = %account.auth_type, "password stored");
        Ok(())
    }

    fn registration_for(&self, account: &Account) -> Result<&Registration> {
        let name = if account.account_type == AccountType::Gmail {
            Provider::google()?.name
        } else {
            Provider::for_email(&account.email)?.name
        };
        self.registrations
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::Config(format!("no OAuth2 client configured for {name}")))
    }
}

#[async_trait]
impl CredentialProvider for OAuth2Authenticator {
    async fn credential(&self, account: &Account) -> Result<Credential> {
        self.get_valid_credential(account).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wabimail_oauth::TokenRecord;

    enum Refresh {
        Succeed,
        Reject,
        Unreachable,
    }

    struct FakeEndpoint {
        refresh: Refresh,
        refreshes: AtomicUsize,
    }

    impl FakeEndpoint {
        fn new(refresh: Refresh) -> Arc<Self> {
            Arc::new(Self {
                refresh,
                refreshes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenEndpoint for FakeEndpoint {
        async fn exchange_code(
            &self,
            code: &str,
            _redirect_uri: &str,
            code_verifier: Option<&str>,
        ) -> wabimail_oauth::Result<TokenRecord> {
            assert_eq!(code, "the-code");
            assert!(code_verifier.is_some());
            Ok(TokenRecord::bearer("issued").with_refresh_token("refresh-1"))
        }

        async fn refresh(&self, _token: &TokenRecord) -> wabimail_oauth::Result<TokenRecord> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            match self.refresh {
                Refresh::Succeed => Ok(TokenRecord::bearer("fresh")
                    .with_expires_at(Utc::now() + chrono::Duration::hours(1))),
                Refresh::Reject => Err(wabimail_oauth::Error::oauth_error(
                    "invalid_grant",
                    "Token has been expired or revoked.",
                )),
                Refresh::Unreachable => Err(wabimail_oauth::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))),
            }
        }
    }

    /// Remembers the consent URL and optionally plays the browser's
    /// redirect back to the listener.
    #[derive(Default)]
    struct ScriptedBrowser {
        redirect: bool,
        opened: Mutex<Option<url::Url>>,
    }

    impl ScriptedBrowser {
        fn callback_port(&self) -> u16 {
            let opened = self.opened.lock().unwrap();
            let url = opened.as_ref().unwrap();
            let redirect = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| url::Url::parse(&v).unwrap())
                .unwrap();
            redirect.port().unwrap()
        }
    }

    impl UserAgent for ScriptedBrowser {
        fn open(&self, url: &str) -> Result<()> {
            let url = url::Url::parse(url).unwrap();
            *self.opened.lock().unwrap() = Some(url.clone());
            if !self.redirect {
                return Ok(());
            }

            let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
            let redirect = url::Url::parse(&pairs["redirect_uri"]).unwrap();
            let port = redirect.port().unwrap();
            let state = pairs["state"].clone();
            tokio::spawn(async move {
                let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
                    .await
                    .unwrap();
                let request =
                    format!("GET /?code=the-code&state={state} HTTP/1.1\r\nHost: localhost\r\n\r\n");
                stream.write_all(request.as_bytes()).await.unwrap();
                let mut response = Vec::new();
                stream.read_to_end(&mut response).await.unwrap();
            });
            Ok(())
        }
    }

    fn gmail() -> Account {
        Account::new("Gmail", "user@gmail.com", AccountType::Gmail)
    }

    fn authenticator(
        dir: &tempfile::TempDir,
        endpoint: Arc<FakeEndpoint>,
        browser: Arc<ScriptedBrowser>,
    ) -> OAuth2Authenticator {
        OAuth2Authenticator::new(Arc::new(CredentialStore::new(dir.path())))
            .with_provider(Provider::google().unwrap(), "client-1", endpoint)
            .with_user_agent(browser)
            .with_port_range(0..=0)
    }

    async fn store_token(auth: &OAuth2Authenticator, account: &Account, token: TokenRecord) {
        auth.credential_store()
            .save(&account.id, &Credential::OAuth2(token))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_flow_stores_token() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(ScriptedBrowser {
            redirect: true,
            ..ScriptedBrowser::default()
        });
        let auth = authenticator(&dir, FakeEndpoint::new(Refresh::Succeed), browser);
        let account = gmail();

        let credential = auth
            .begin_auth_flow(&account, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(credential.secret(), "issued");
        assert_eq!(
            auth.credential_store().load(&account.id).await.unwrap(),
            credential
        );
    }

    #[tokio::test]
    async fn test_flow_cancel_releases_port() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(ScriptedBrowser::default());
        let auth = authenticator(&dir, FakeEndpoint::new(Refresh::Succeed), browser.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let result = auth.begin_auth_flow(&gmail(), &cancel).await;
        assert!(matches!(result, Err(Error::AuthCancelled)));

        let port = browser.callback_port();
        assert!(tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_flow_timeout_releases_port() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(ScriptedBrowser::default());
        let auth = authenticator(&dir, FakeEndpoint::new(Refresh::Succeed), browser.clone())
            .with_flow_timeout(Duration::from_millis(100));

        let result = auth.begin_auth_flow(&gmail(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::AuthTimeout(_))));

        let port = browser.callback_port();
        assert!(tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_flow_without_client() {
        let dir = tempfile::tempdir().unwrap();
        let auth = OAuth2Authenticator::new(Arc::new(CredentialStore::new(dir.path())));
        let result = auth.begin_auth_flow(&gmail(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_valid_token_is_not_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeEndpoint::new(Refresh::Succeed);
        let auth = authenticator(&dir, endpoint.clone(), Arc::default());
        let account = gmail();

        store_token(
            &auth,
            &account,
            TokenRecord::bearer("current")
                .with_refresh_token("r")
                .with_expires_at(Utc::now() + chrono::Duration::minutes(30)),
        )
        .await;
        assert_eq!(auth.get_valid_credential(&account).await.unwrap().secret(), "current");

        store_token(&auth, &account, TokenRecord::bearer("no-expiry")).await;
        assert_eq!(auth.get_valid_credential(&account).await.unwrap().secret(), "no-expiry");
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeEndpoint::new(Refresh::Succeed);
        let auth = authenticator(&dir, endpoint.clone(), Arc::default());
        let account = gmail();
        store_token(
            &auth,
            &account,
            TokenRecord::bearer("old")
                .with_refresh_token("keep-me")
                .with_expires_at(Utc::now() + chrono::Duration::minutes(2)),
        )
        .await;

        let Credential::OAuth2(token) = auth.get_valid_credential(&account).await.unwrap() else {
            panic!("expected a token");
        };
        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);

        let stored = auth.credential_store().load(&account.id).await.unwrap();
        assert_eq!(stored.secret(), "fresh");
    }

    #[tokio::test]
    async fn test_rejected_refresh_requires_reauth() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&dir, FakeEndpoint::new(Refresh::Reject), Arc::default());
        let account = gmail();
        store_token(
            &auth,
            &account,
            TokenRecord::bearer("old")
                .with_refresh_token("revoked")
                .with_expires_at(Utc::now() - chrono::Duration::minutes(1)),
        )
        .await;

        assert!(matches!(
            auth.get_valid_credential(&account).await,
            Err(Error::ReauthRequired(_))
        ));
        assert!(!auth.credential_store().contains(&account.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_keeps_credential() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&dir, FakeEndpoint::new(Refresh::Unreachable), Arc::default());
        let account = gmail();
        store_token(
            &auth,
            &account,
            TokenRecord::bearer("old")
                .with_refresh_token("r")
                .with_expires_at(Utc::now()),
        )
        .await;

        assert!(matches!(
            auth.get_valid_credential(&account).await,
            Err(Error::Connection(_))
        ));
        assert!(auth.credential_store().contains(&account.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_expiring_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&dir, FakeEndpoint::new(Refresh::Succeed), Arc::default());
        let account = gmail();
        store_token(
            &auth,
            &account,
            TokenRecord::bearer("old").with_expires_at(Utc::now()),
        )
        .await;

        assert!(matches!(
            auth.get_valid_credential(&account).await,
            Err(Error::ReauthRequired(_))
        ));
        assert!(!auth.credential_store().contains(&account.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_passwords_and_missing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&dir, FakeEndpoint::new(Refresh::Succeed), Arc::default());
        let account = Account::new("Work", "me@example.com", AccountType::Imap)
            .with_auth_type(AuthType::AppPassword);

        assert!(matches!(
            auth.get_valid_credential(&account).await,
            Err(Error::ReauthRequired(_))
        ));

        auth.store_password(&account, "abcd efgh").await.unwrap();
        assert_eq!(
            auth.get_valid_credential(&account).await.unwrap(),
            Credential::AppPassword("abcd efgh".into())
        );

        auth.sign_out(&account.id).await.unwrap();
        assert!(!auth.credential_store().contains(&account.id).await.unwrap());

        assert!(matches!(
            auth.store_password(&gmail(), "x").await,
            Err(Error::Unsupported(_))
        ));
    }
}
