// ============================
// crates/backend-lib/src/storage/mod.rs
// ============================
//! Storage abstraction for the records the engine owns.
//!
//! Three collaborators are consumed: a credential store, a session store and
//! settings persistence. [`MemoryStorage`] implements all three in process;
//! [`FlatFileStorage`] adds JSON snapshots on disk.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Account, AccountId, Session};

mod flat_file;
mod memory;

pub use flat_file::FlatFileStorage;
pub use memory::MemoryStorage;
pub(crate) use memory::redact;

/// Infrastructure-level failure. This layer never retries on its own.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Concurrent update conflict on {0}")]
    Conflict(String),
}

/// Persisted settings row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingRecord {
    pub key: String,
    /// Canonical string form of the typed value
    pub value: String,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// Credential store
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look an account up by its (already normalized) login identifier
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError>;

    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Insert a new account; fails with [`StoreError::Duplicate`] when the identifier is taken
    async fn insert(&self, account: Account) -> Result<(), StoreError>;

    /// Replace the stored account with `account` if the stored version still
    /// equals `expected_version`. The store bumps the version on success.
    /// Returns `Ok(false)` when another writer got there first.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        account: Account,
    ) -> Result<bool, StoreError>;
}

/// Session store, keyed by token
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<(), StoreError>;

    async fn get(&self, token: &str) -> Result<Option<Session>, StoreError>;

    /// Atomically extend a session. The deadline only moves when the session
    /// is not revoked, has not expired at `at`, and `at` is not older than
    /// its last activity. Returns the session as stored after the call.
    async fn touch(
        &self,
        token: &str,
        at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Mark one session revoked. Returns false if the token is unknown.
    async fn revoke(&self, token: &str) -> Result<bool, StoreError>;

    /// Revoke every live session of an account except `except`.
    /// Returns how many sessions were newly revoked.
    async fn revoke_all(
        &self,
        account_id: AccountId,
        except: Option<&str>,
    ) -> Result<usize, StoreError>;

    /// Delete every session with `expires_at < now`
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Settings persistence
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn load(&self) -> Result<Vec<SettingRecord>, StoreError>;

    /// Persist every record or none of them
    async fn save_batch(&self, records: &[SettingRecord]) -> Result<(), StoreError>;
}
