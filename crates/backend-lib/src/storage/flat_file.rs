// ============================
// crates/backend-lib/src/storage/flat_file.rs
// ============================
//! Flat-file storage: JSON snapshots of the in-memory maps.
//!
//! Every mutation is staged on a private copy, the resulting snapshot is
//! written through a temp file + rename, and only then is the change committed
//! in memory. A failed write leaves the process state untouched, and a crash
//! never leaves a torn snapshot.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::{fs as tokio_fs, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

use super::{AccountStore, MemoryStorage, SessionStore, SettingRecord, SettingsRepository, StoreError};
use crate::models::{Account, AccountId, Session};

const ACCOUNTS_FILE: &str = "accounts.json";
const SESSIONS_FILE: &str = "sessions.json";
const SETTINGS_FILE: &str = "settings.json";

/// Flat-file implementation of the storage traits
#[derive(Debug)]
pub struct FlatFileStorage {
    root: PathBuf,
    inner: MemoryStorage,
    // One writer per file. Holding it from staging to commit keeps the
    // staged copy equal to `inner`.
    accounts_lock: Mutex<()>,
    sessions_lock: Mutex<()>,
    settings_lock: Mutex<()>,
}

impl FlatFileStorage {
    /// Open (or create) a storage directory and load any existing snapshots
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let accounts: Vec<Account> = read_snapshot(&root.join(ACCOUNTS_FILE))?;
        let sessions: Vec<Session> = read_snapshot(&root.join(SESSIONS_FILE))?;
        let settings: Vec<SettingRecord> = read_snapshot(&root.join(SETTINGS_FILE))?;
        debug!(
            root = %root.display(),
            accounts = accounts.len(),
            sessions = sessions.len(),
            settings = settings.len(),
            "opened flat-file storage"
        );

        Ok(Self {
            inner: MemoryStorage::from_parts(accounts, sessions, settings),
            root,
            accounts_lock: Mutex::new(()),
            sessions_lock: Mutex::new(()),
            settings_lock: Mutex::new(()),
        })
    }

    async fn write_accounts(&self, staged: &MemoryStorage) -> Result<(), StoreError> {
        write_snapshot(&self.root.join(ACCOUNTS_FILE), &staged.accounts_snapshot()).await
    }

    async fn write_sessions(&self, staged: &MemoryStorage) -> Result<(), StoreError> {
        write_snapshot(&self.root.join(SESSIONS_FILE), &staged.sessions_snapshot()).await
    }
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

async fn write_snapshot<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(records)?;
    let tmp = path.with_extension("json.tmp");

    let mut file = tokio_fs::File::create(&tmp).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    tokio_fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl AccountStore for FlatFileStorage {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        self.inner.find_by_identifier(identifier).await
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        AccountStore::get(&self.inner, id).await
    }

    async fn insert(&self, account: Account) -> Result<(), StoreError> {
        let _guard = self.accounts_lock.lock().await;
        let staged = self.inner.detached_accounts();
        AccountStore::insert(&staged, account.clone()).await?;
        self.write_accounts(&staged).await?;
        AccountStore::insert(&self.inner, account).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        account: Account,
    ) -> Result<bool, StoreError> {
        let _guard = self.accounts_lock.lock().await;
        let staged = self.inner.detached_accounts();
        if !staged.compare_and_swap(expected_version, account.clone()).await? {
            return Ok(false);
        }
        self.write_accounts(&staged).await?;
        self.inner.compare_and_swap(expected_version, account).await
    }
}

#[async_trait]
impl SessionStore for FlatFileStorage {
    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        let _guard = self.sessions_lock.lock().await;
        let staged = self.inner.detached_sessions();
        SessionStore::insert(&staged, session.clone()).await?;
        self.write_sessions(&staged).await?;
        SessionStore::insert(&self.inner, session).await
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, StoreError> {
        SessionStore::get(&self.inner, token).await
    }

    async fn touch(
        &self,
        token: &str,
        at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let _guard = self.sessions_lock.lock().await;
        let staged = self.inner.detached_sessions();
        if staged.touch(token, at, expires_at).await?.is_none() {
            return Ok(None);
        }
        self.write_sessions(&staged).await?;
        self.inner.touch(token, at, expires_at).await
    }

    async fn revoke(&self, token: &str) -> Result<bool, StoreError> {
        let _guard = self.sessions_lock.lock().await;
        let staged = self.inner.detached_sessions();
        if !staged.revoke(token).await? {
            return Ok(false);
        }
        self.write_sessions(&staged).await?;
        self.inner.revoke(token).await
    }

    async fn revoke_all(
        &self,
        account_id: AccountId,
        except: Option<&str>,
    ) -> Result<usize, StoreError> {
        let _guard = self.sessions_lock.lock().await;
        let staged = self.inner.detached_sessions();
        if staged.revoke_all(account_id, except).await? == 0 {
            return Ok(0);
        }
        self.write_sessions(&staged).await?;
        self.inner.revoke_all(account_id, except).await
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let _guard = self.sessions_lock.lock().await;
        let staged = self.inner.detached_sessions();
        if staged.remove_expired(now).await? == 0 {
            return Ok(0);
        }
        self.write_sessions(&staged).await?;
        self.inner.remove_expired(now).await
    }
}

#[async_trait]
impl SettingsRepository for FlatFileStorage {
    async fn load(&self) -> Result<Vec<SettingRecord>, StoreError> {
        self.inner.load().await
    }

    async fn save_batch(&self, records: &[SettingRecord]) -> Result<(), StoreError> {
        let _guard = self.settings_lock.lock().await;
        let merged = self.inner.settings_with(records);
        write_snapshot(&self.root.join(SETTINGS_FILE), &merged).await?;
        self.inner.save_batch(records).await
    }
}
