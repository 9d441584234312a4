//! The set of configured accounts.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::model::{Account, AccountId, AccountType};
use super::store::AccountStore;
use super::validation::validate_account;
use crate::{Error, Result};

/// Counts over the account set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatistics {
    /// All accounts.
    pub total: usize,
    /// Accounts with `is_active`.
    pub active: usize,
    /// Accounts without `is_active`.
    pub inactive: usize,
    /// Count per account type name; every type is present.
    pub by_type: BTreeMap<String, usize>,
    /// Whether a default account exists.
    pub has_default: bool,
}

/// Owns the account set and keeps it persisted.
///
/// Every mutating call validates, updates the in-memory set and writes the
/// whole set through the [`AccountStore`]. If the write fails the
/// in-memory set is left as it was.
pub struct AccountManager {
    store: Arc<dyn AccountStore>,
    accounts: RwLock<Vec<Account>>,
}

impl std::fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager").finish_non_exhaustive()
    }
}

impl AccountManager {
    /// Loads the account set from `store`.
    ///
    /// A stored set without exactly one default is repaired in memory: the
    /// oldest account becomes the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load(store: Arc<dyn AccountStore>) -> Result<Self> {
        let mut accounts = store.load_all().await?;
        let defaults = accounts.iter().filter(|a| a.is_default).count();
        if !accounts.is_empty() && defaults != 1 {
            warn!(defaults, "repairing default account flag");
            ensure_single_default(&mut accounts);
        }
        info!(count = accounts.len(), "accounts loaded");
        Ok(Self {
            store,
            accounts: RwLock::new(accounts),
        })
    }

    /// Adds an account. The first account becomes the default.
    ///
    /// Gmail accounts with empty hosts get the Gmail preset first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSettings`] if validation fails
    /// - [`Error::DuplicateAccount`] if the address is already configured
    ///   (case-insensitive)
    /// - storage errors from the store
    pub async fn add(&self, mut account: Account) -> Result<Account> {
        account.email = account.email.trim().to_string();
        account.apply_preset();
        validate_account(&account).map_err(Error::InvalidSettings)?;

        let mut accounts = self.accounts.write().await;
        if accounts.iter().any(|a| same_email(&a.email, &account.email)) {
            return Err(Error::DuplicateAccount(account.email));
        }
        if accounts.iter().any(|a| a.id == account.id) {
            account.id = AccountId::generate();
        }
        account.is_default = accounts.is_empty();

        let mut next = accounts.clone();
        next.push(account.clone());
        self.store.save_all(&next).await?;
        *accounts = next;

        info!(account = %account.id, email = %account.email, kind = %account.account_type, "account added");
        Ok(account)
    }

    /// Replaces an account's editable fields.
    ///
    /// The stored id, creation time and default flag are kept; the default
    /// only changes through [`set_default`](Self::set_default).
    ///
    /// # Errors
    ///
    /// - [`Error::AccountNotFound`] if no account has this id
    /// - [`Error::InvalidSettings`] if validation fails
    /// - [`Error::DuplicateAccount`] if another account has the address
    pub async fn update(&self, mut account: Account) -> Result<Account> {
        account.email = account.email.trim().to_string();
        account.apply_preset();
        validate_account(&account).map_err(Error::InvalidSettings)?;

        let mut accounts = self.accounts.write().await;
        let index = position(&accounts, &account.id)?;
        if accounts
            .iter()
            .any(|a| a.id != account.id && same_email(&a.email, &account.email))
        {
            return Err(Error::DuplicateAccount(account.email));
        }

        let current = &accounts[index];
        account.created_at = current.created_at;
        account.is_default = current.is_default;

        let mut next = accounts.clone();
        next[index] = account.clone();
        self.store.save_all(&next).await?;
        *accounts = next;

        info!(account = %account.id, "account updated");
        Ok(account)
    }

    /// Removes an account and returns it. Removing the default promotes the
    /// oldest remaining account.
    ///
    /// Stored credentials are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] or a storage error.
    pub async fn remove(&self, id: &AccountId) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let index = position(&accounts, id)?;

        let mut next = accounts.clone();
        let removed = next.remove(index);
        if removed.is_default {
            ensure_single_default(&mut next);
        }
        self.store.save_all(&next).await?;
        *accounts = next;

        info!(account = %removed.id, email = %removed.email, "account removed");
        Ok(removed)
    }

    /// Account with this address, compared case-insensitively.
    pub async fn get_by_email(&self, email: &str) -> Option<Account> {
        let email = email.trim();
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| same_email(&a.email, email))
            .cloned()
    }

    /// Account with this id.
    pub async fn get(&self, id: &AccountId) -> Option<Account> {
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| &a.id == id)
            .cloned()
    }

    /// All accounts in insertion order.
    pub async fn list(&self) -> Vec<Account> {
        self.accounts.read().await.clone()
    }

    /// Accounts with `is_active`.
    pub async fn active(&self) -> Vec<Account> {
        self.filtered(|a| a.is_active).await
    }

    /// Accounts of one type.
    pub async fn by_type(&self, account_type: AccountType) -> Vec<Account> {
        self.filtered(|a| a.account_type == account_type).await
    }

    /// The default account; `None` only when there are no accounts.
    pub async fn default_account(&self) -> Option<Account> {
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| a.is_default)
            .cloned()
    }

    /// Makes `id` the default account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] or a storage error.
    pub async fn set_default(&self, id: &AccountId) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        position(&accounts, id)?;

        let mut next = accounts.clone();
        for account in &mut next {
            account.is_default = &account.id == id;
        }
        self.store.save_all(&next).await?;
        *accounts = next;

        info!(account = %id, "default account changed");
        Ok(())
    }

    /// Records a successful fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] or a storage error.
    pub async fn update_last_sync(&self, id: &AccountId, when: DateTime<Utc>) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let index = position(&accounts, id)?;

        let mut next = accounts.clone();
        next[index].last_sync = Some(when);
        self.store.save_all(&next).await?;
        *accounts = next;

        debug!(account = %id, %when, "last sync updated");
        Ok(())
    }

    /// Number of accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Whether there are no accounts.
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    /// Counts by state and type.
    pub async fn statistics(&self) -> AccountStatistics {
        let accounts = self.accounts.read().await;
        let active = accounts.iter().filter(|a| a.is_active).count();
        let by_type = AccountType::ALL
            .iter()
            .map(|t| {
                let count = accounts.iter().filter(|a| a.account_type == *t).count();
                (t.as_str().to_string(), count)
            })
            .collect();
        AccountStatistics {
            total: accounts.len(),
            active,
            inactive: accounts.len() - active,
            by_type,
            has_default: accounts.iter().any(|a| a.is_default),
        }
    }

    /// Renders the account set as pretty JSON for backup.
    ///
    /// Accounts carry no secrets. Without `include_sensitive` the login
    /// name overrides are left out as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if serialization fails.
    pub async fn export_json(&self, include_sensitive: bool) -> Result<String> {
        let mut accounts = self.list().await;
        if !include_sensitive {
            for account in &mut accounts {
                account.settings.username = None;
            }
        }
        let export = serde_json::json!({
            "version": "1.0",
            "exported_at": Utc::now().to_rfc3339(),
            "wabimail_export": true,
            "include_sensitive": include_sensitive,
            "accounts": accounts,
        });
        serde_json::to_string_pretty(&export).map_err(|e| Error::Storage(e.to_string()))
    }

    async fn filtered(&self, keep: impl Fn(&Account) -> bool) -> Vec<Account> {
        self.accounts
            .read()
            .await
            .iter()
            .filter(|a| keep(a))
            .cloned()
            .collect()
    }
}

/// Addresses may carry non-ASCII local parts, so case folding is
/// Unicode-aware.
fn same_email(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn position(accounts: &[Account], id: &AccountId) -> Result<usize> {
    accounts
        .iter()
        .position(|a| &a.id == id)
        .ok_or_else(|| Error::AccountNotFound(id.to_string()))
}

/// Leaves exactly one default: the first flagged account, or else the
/// oldest.
fn ensure_single_default(accounts: &mut [Account]) {
    let chosen = accounts
        .iter()
        .position(|a| a.is_default)
        .or_else(|| {
            accounts
                .iter()
                .enumerate()
                .min_by_key(|(_, a)| a.created_at)
                .map(|(i, _)| i)
        });
    for (i, account) in accounts.iter_mut().enumerate() {
        account.is_default = Some(i) == chosen;
    }
}
