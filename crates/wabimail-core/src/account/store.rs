//! Account persistence.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::model::{Account, AccountId, AccountSettings};
use crate::{Error, Result};

/// Where the account set is kept. The manager writes the whole set after
/// every change.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Loads every stored account in insertion order.
    async fn load_all(&self) -> Result<Vec<Account>>;

    /// Replaces the stored set with `accounts`.
    async fn save_all(&self, accounts: &[Account]) -> Result<()>;
}

/// Keeps accounts in memory only.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
}

impl MemoryAccountStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `accounts`.
    #[must_use]
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load_all(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.lock().await.clone())
    }

    async fn save_all(&self, accounts: &[Account]) -> Result<()> {
        *self.accounts.lock().await = accounts.to_vec();
        Ok(())
    }
}

/// `SQLite` backend: one row per account, server settings as a JSON
/// column.
#[derive(Debug, Clone)]
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory, connection or schema cannot be
    /// created.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("{}: {e}", parent.display())))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        debug!(path = %path.display(), "account database opened");
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                account_type TEXT NOT NULL,
                auth_type TEXT NOT NULL,
                settings TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_sync TEXT,
                sync_enabled INTEGER NOT NULL DEFAULT 1,
                signature TEXT NOT NULL DEFAULT '',
                display_name TEXT NOT NULL DEFAULT ''
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn load_all(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email, account_type, auth_type, settings,
                   is_active, is_default, created_at, last_sync,
                   sync_enabled, signature, display_name
            FROM accounts
            ORDER BY position ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_account(row) {
                Ok(account) => accounts.push(account),
                Err(e) => {
                    let id: String = row.try_get("id").unwrap_or_default();
                    warn!(account = %id, error = %e, "skipping unreadable account row");
                }
            }
        }
        Ok(accounts)
    }

    async fn save_all(&self, accounts: &[Account]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM accounts").execute(&mut *tx).await?;

        for (position, account) in accounts.iter().enumerate() {
            let settings = serde_json::to_string(&account.settings)
                .map_err(|e| Error::Storage(e.to_string()))?;
            sqlx::query(
                r"
                INSERT INTO accounts (
                    id, position, name, email, account_type, auth_type, settings,
                    is_active, is_default, created_at, last_sync,
                    sync_enabled, signature, display_name
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(account.id.as_str())
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(&account.name)
            .bind(&account.email)
            .bind(account.account_type.as_str())
            .bind(account.auth_type.as_str())
            .bind(settings)
            .bind(account.is_active)
            .bind(account.is_default)
            .bind(account.created_at.to_rfc3339())
            .bind(account.last_sync.map(|t| t.to_rfc3339()))
            .bind(account.sync_enabled)
            .bind(&account.signature)
            .bind(&account.display_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = accounts.len(), "accounts saved");
        Ok(())
    }
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let settings: String = row.try_get("settings")?;
    let settings: AccountSettings =
        serde_json::from_str(&settings).map_err(|e| Error::Storage(e.to_string()))?;
    let account_type: String = row.try_get("account_type")?;
    let auth_type: String = row.try_get("auth_type")?;
    let created_at: String = row.try_get("created_at")?;
    let last_sync: Option<String> = row.try_get("last_sync")?;

    Ok(Account {
        id: AccountId::from(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        account_type: account_type.parse().map_err(Error::Storage)?,
        auth_type: auth_type.parse().map_err(Error::Storage)?,
        settings,
        is_active: row.try_get("is_active")?,
        is_default: row.try_get("is_default")?,
        created_at: parse_time(&created_at)?,
        last_sync: last_sync.as_deref().map(parse_time).transpose()?,
        sync_enabled: row.try_get("sync_enabled")?,
        signature: row.try_get("signature")?,
        display_name: row.try_get("display_name")?,
    })
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp '{s}': {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::AccountType;

    fn sample() -> Vec<Account> {
        let mut gmail = Account::new("Gmail", "user@gmail.com", AccountType::Gmail)
            .with_signature("Taro");
        gmail.is_default = true;
        gmail.last_sync = Some(Utc::now());
        let mut pop = Account::new("Pop", "me@example.com", AccountType::Pop3);
        pop.settings.incoming_server = "pop.example.com".into();
        pop.settings.username = Some("me".into());
        pop.is_active = false;
        vec![gmail, pop]
    }

    #[tokio::test]
    async fn test_sqlite_save_and_load() {
        let store = SqliteAccountStore::in_memory().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());

        let accounts = sample();
        store.save_all(&accounts).await.unwrap();
        let loaded = store.load_all().await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, accounts[0].id);
        assert_eq!(loaded[0].signature, "Taro");
        assert!(loaded[0].is_default);
        assert_eq!(
            loaded[0].last_sync.map(|t| t.timestamp()),
            accounts[0].last_sync.map(|t| t.timestamp())
        );
        assert_eq!(loaded[1].settings, accounts[1].settings);
        assert!(!loaded[1].is_active);
    }

    #[tokio::test]
    async fn test_sqlite_save_replaces_set() {
        let store = SqliteAccountStore::in_memory().await.unwrap();
        let accounts = sample();
        store.save_all(&accounts).await.unwrap();
        store.save_all(&accounts[1..]).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].email, "me@example.com");
    }

    #[tokio::test]
    async fn test_sqlite_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("accounts.db");
        {
            let store = SqliteAccountStore::open(&path).await.unwrap();
            store.save_all(&sample()).await.unwrap();
        }
        let store = SqliteAccountStore::open(&path).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_skips_unreadable_rows() {
        let store = SqliteAccountStore::in_memory().await.unwrap();
        store.save_all(&sample()).await.unwrap();
        sqlx::query("UPDATE accounts SET settings = 'not json' WHERE position = 0")
            .execute(&store.pool)
            .await
            .unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].email, "me@example.com");
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryAccountStore::new();
        store.save_all(&sample()).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }
}
