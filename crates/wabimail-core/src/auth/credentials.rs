//! Encrypted credential storage.
//!
//! Each account's secret is sealed with AES-256-GCM under a key generated
//! on first use. Record layout:
//!
//! ```text
//! +---------+-------------+----------------------+
//! | version | nonce (12)  | ciphertext + tag     |
//! +---------+-------------+----------------------+
//! ```
//!
//! The account id is the additional authenticated data, so a record only
//! opens under the account it was written for.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use wabimail_oauth::TokenRecord;

use super::locks::AccountLocks;
use crate::account::AccountId;
use crate::{Error, Result};

const FORMAT_VERSION: u8 = 1;
const KEY_LEN: usize = 32;
const KEY_FILE: &str = ".key";
const RECORD_EXT: &str = "cred";

/// A stored secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Credential {
    /// Account password.
    Password(String),
    /// Provider-issued application password.
    AppPassword(String),
    /// `OAuth2` token set.
    #[serde(rename = "oauth2")]
    OAuth2(TokenRecord),
}

impl Credential {
    /// The value handed to the server: the password or the access token.
    #[must_use]
    pub fn secret(&self) -> &str {
        match self {
            Self::Password(secret) | Self::AppPassword(secret) => secret,
            Self::OAuth2(token) => &token.access_token,
        }
    }

    /// Whether this is a bearer token.
    #[must_use]
    pub const fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuth2(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::AppPassword(_) => f.write_str("AppPassword(<redacted>)"),
            Self::OAuth2(token) => f.debug_tuple("OAuth2").field(token).finish(),
        }
    }
}

/// Encrypted per-account credential files in one directory.
///
/// Operations on the same account are serialised; file I/O runs on the
/// blocking pool.
#[derive(Debug)]
pub struct CredentialStore {
    dir: PathBuf,
    key: OnceCell<[u8; KEY_LEN]>,
    locks: AccountLocks,
}

impl CredentialStore {
    /// Creates a store rooted at `dir`. Nothing is touched until the
    /// first operation.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key: OnceCell::new(),
            locks: AccountLocks::default(),
        }
    }

    /// The directory holding the records and the key.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encrypts and writes `credential` for `id`, replacing any previous
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure or an unusable id and
    /// [`Error::Decrypt`] if the key file is damaged.
    pub async fn save(&self, id: &AccountId, credential: &Credential) -> Result<()> {
        check_id(id)?;
        let _guard = self.locks.lock(id.as_str()).await;
        let key = self.key().await?;

        let plaintext =
            serde_json::to_vec(credential).map_err(|e| Error::Storage(e.to_string()))?;
        let dir = self.dir.clone();
        let id_owned = id.clone();
        blocking(move || {
            let record = seal(&key, &id_owned, plaintext)?;
            write_atomic(&record_path(&dir, &id_owned), &record)
        })
        .await?;

        debug!(account = %id, oauth = credential.is_oauth(), "credential saved");
        Ok(())
    }

    /// Reads and decrypts the credential of `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing is stored
    /// - [`Error::Decrypt`] if the record was tampered with, is corrupt or
    ///   belongs to another account
    /// - [`Error::Storage`] on I/O failure
    pub async fn load(&self, id: &AccountId) -> Result<Credential> {
        check_id(id)?;
        let _guard = self.locks.lock(id.as_str()).await;
        let path = record_path(&self.dir, id);
        let record = blocking(move || match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage(&path, &e)),
        })
        .await?
        .ok_or_else(|| Error::NotFound(format!("credential for {id}")))?;

        let key = self.key().await?;
        let plaintext = open(&key, id, record)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Decrypt(format!("credential for {id} is unreadable: {e}")))
    }

    /// Removes the record of `id`. Removing a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on I/O failure.
    pub async fn delete(&self, id: &AccountId) -> Result<()> {
        check_id(id)?;
        let _guard = self.locks.lock(id.as_str()).await;
        let path = record_path(&self.dir, id);
        let removed = blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage(&path, &e)),
        })
        .await?;

        if removed {
            info!(account = %id, "credential deleted");
        }
        Ok(())
    }

    /// Ids with a stored record, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<AccountId>> {
        let dir = self.dir.clone();
        blocking(move || {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(storage(&dir, &e)),
            };
            let mut ids = Vec::new();
            for entry in entries {
                let path = entry.map_err(|e| storage(&dir, &e))?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(AccountId::from(stem));
                }
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }

    /// Whether a record exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] for an unusable id.
    pub async fn contains(&self, id: &AccountId) -> Result<bool> {
        check_id(id)?;
        let path = record_path(&self.dir, id);
        blocking(move || Ok(path.is_file())).await
    }

    async fn key(&self) -> Result<[u8; KEY_LEN]> {
        let dir = self.dir.clone();
        self.key
            .get_or_try_init(|| blocking(move || load_or_create_key(&dir)))
            .await
            .copied()
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Storage(format!("storage task failed: {e}")))?
}

fn check_id(id: &AccountId) -> Result<()> {
    let s = id.as_str();
    if !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        Ok(())
    } else {
        Err(Error::Storage(format!("unusable account id '{s}'")))
    }
}

fn record_path(dir: &Path, id: &AccountId) -> PathBuf {
    dir.join(format!("{}.{RECORD_EXT}", id.as_str()))
}

fn storage(path: &Path, e: &std::io::Error) -> Error {
    Error::Storage(format!("{}: {e}", path.display()))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| storage(dir, &e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| storage(dir, &e))?;
    }
    Ok(())
}

fn load_or_create_key(dir: &Path) -> Result<[u8; KEY_LEN]> {
    ensure_dir(dir)?;
    let path = dir.join(KEY_FILE);
    match fs::read(&path) {
        Ok(bytes) => return key_from_bytes(&bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(storage(&path, &e)),
    }

    let mut key = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut key)
        .map_err(|_| Error::Storage("system random source failed".into()))?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(&path) {
        Ok(mut file) => {
            file.write_all(&key).map_err(|e| storage(&path, &e))?;
            file.sync_all().map_err(|e| storage(&path, &e))?;
            info!(path = %path.display(), "credential key created");
            Ok(key)
        }
        // Another process won the race; use its key.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let bytes = fs::read(&path).map_err(|e| storage(&path, &e))?;
            key_from_bytes(&bytes)
        }
        Err(e) => Err(storage(&path, &e)),
    }
}

fn key_from_bytes(bytes: &[u8]) -> Result<[u8; KEY_LEN]> {
    bytes.try_into().map_err(|_| {
        Error::Decrypt(format!(
            "key file holds {} bytes, expected {KEY_LEN}",
            bytes.len()
        ))
    })
}

fn cipher(key: &[u8; KEY_LEN]) -> Result<LessSafeKey> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| Error::Decrypt("unusable key".into()))
}

fn seal(key: &[u8; KEY_LEN], id: &AccountId, mut plaintext: Vec<u8>) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| Error::Storage("system random source failed".into()))?;

    cipher(key)?
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(id.as_str().as_bytes()),
            &mut plaintext,
        )
        .map_err(|_| Error::Storage("encryption failed".into()))?;

    let mut record = Vec::with_capacity(1 + NONCE_LEN + plaintext.len());
    record.push(FORMAT_VERSION);
    record.extend_from_slice(&nonce);
    record.extend_from_slice(&plaintext);
    Ok(record)
}

fn open(key: &[u8; KEY_LEN], id: &AccountId, mut record: Vec<u8>) -> Result<Vec<u8>> {
    let header = 1 + NONCE_LEN;
    if record.len() < header + AES_256_GCM.tag_len() {
        return Err(Error::Decrypt(format!("record for {id} is truncated")));
    }
    if record[0] != FORMAT_VERSION {
        return Err(Error::Decrypt(format!(
            "record for {id} has unknown version {}",
            record[0]
        )));
    }
    let nonce = Nonce::try_assume_unique_for_key(&record[1..header])
        .map_err(|_| Error::Decrypt("bad nonce".into()))?;

    let mut sealed = record.split_off(header);
    let plaintext = cipher(key)?
        .open_in_place(nonce, Aad::from(id.as_str().as_bytes()), &mut sealed)
        .map_err(|_| Error::Decrypt(format!("record for {id} failed authentication")))?;
    Ok(plaintext.to_vec())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }
    let tmp = path.with_extension(format!("{RECORD_EXT}.tmp"));
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp).map_err(|e| storage(&tmp, &e))?;
    file.write_all(bytes).map_err(|e| storage(&tmp, &e))?;
    file.sync_all().map_err(|e| storage(&tmp, &e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| storage(path, &e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token() -> Credential {
        Credential::OAuth2(
            TokenRecord::bearer("ya29.access")
                .with_refresh_token("1//refresh")
                .with_expires_at(Utc::now() + Duration::hours(1)),
        )
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials"));
        let id = AccountId::generate();

        store.save(&id, &token()).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), token());
        assert!(store.contains(&id).await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec![id.clone()]);

        store
            .save(&id, &Credential::Password("hunter2".into()))
            .await
            .unwrap();
        assert_eq!(store.load(&id).await.unwrap().secret(), "hunter2");

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(matches!(store.load(&id).await, Err(Error::NotFound(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let id = AccountId::from("acct-1");
        store
            .save(&id, &Credential::AppPassword("abcd efgh".into()))
            .await
            .unwrap();

        let bytes = fs::read(dir.path().join("acct-1.cred")).unwrap();
        assert_eq!(bytes[0], FORMAT_VERSION);
        assert!(!String::from_utf8_lossy(&bytes).contains("abcd efgh"));
    }

    #[tokio::test]
    async fn test_tampered_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let id = AccountId::from("acct-1");
        store.save(&id, &token()).await.unwrap();

        let path = dir.path().join("acct-1.cred");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(store.load(&id).await, Err(Error::Decrypt(_))));
    }

    #[tokio::test]
    async fn test_record_bound_to_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let a = AccountId::from("account-a");
        let b = AccountId::from("account-b");
        store.save(&a, &token()).await.unwrap();

        fs::copy(dir.path().join("account-a.cred"), dir.path().join("account-b.cred")).unwrap();
        assert!(matches!(store.load(&b).await, Err(Error::Decrypt(_))));
        assert!(store.load(&a).await.is_ok());
    }

    #[tokio::test]
    async fn test_key_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let id = AccountId::from("acct-1");
        CredentialStore::new(dir.path())
            .save(&id, &token())
            .await
            .unwrap();
        assert_eq!(
            CredentialStore::new(dir.path()).load(&id).await.unwrap(),
            token()
        );
    }

    #[tokio::test]
    async fn test_bad_key_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(KEY_FILE), [0u8; 16]).unwrap();
        let store = CredentialStore::new(dir.path());
        let result = store
            .save(&AccountId::from("acct-1"), &token())
            .await;
        assert!(matches!(result, Err(Error::Decrypt(_))));
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        for id in ["", "../escape", "a/b", "a.b"] {
            assert!(matches!(
                store.load(&AccountId::from(id)).await,
                Err(Error::Storage(_))
            ));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("credentials");
        let store = CredentialStore::new(&root);
        store.save(&AccountId::from("acct-1"), &token()).await.unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&root), 0o700);
        assert_eq!(mode(&root.join(KEY_FILE)), 0o600);
        assert_eq!(mode(&root.join("acct-1.cred")), 0o600);
    }

    #[test]
    fn test_debug_is_redacted() {
        let debug = format!("{:?}", Credential::Password("hunter2".into()));
        assert!(!debug.contains("hunter2"));
        let debug = format!("{:?}", token());
        assert!(!debug.contains("ya29.access"));
        assert!(!debug.contains("1//refresh"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Credential::AppPassword("x".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "app_password", "value": "x"}));
        let json = serde_json::to_value(token()).unwrap();
        assert_eq!(json["kind"], "oauth2");
    }
}
