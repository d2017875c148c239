//! In-process storage backed by `DashMap`.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{AccountStore, SessionStore, SettingRecord, SettingsRepository, StoreError};
use crate::models::{Account, AccountId, Session};

/// In-memory implementation of every storage trait.
///
/// Clones share the same maps. Each mutation holds the shard lock of the
/// record it touches, which is what makes compare-and-swap and touch atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    accounts: Arc<DashMap<AccountId, Account>>,
    identifiers: Arc<DashMap<String, AccountId>>,
    sessions: Arc<DashMap<String, Session>>,
    settings: Arc<Mutex<BTreeMap<String, SettingRecord>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        accounts: Vec<Account>,
        sessions: Vec<Session>,
        settings: Vec<SettingRecord>,
    ) -> Self {
        let storage = Self::new();
        for account in accounts {
            storage.identifiers.insert(account.identifier.clone(), account.id);
            storage.accounts.insert(account.id, account);
        }
        for session in sessions {
            storage.sessions.insert(session.token.clone(), session);
        }
        {
            let mut map = storage.settings.lock();
            for record in settings {
                map.insert(record.key.clone(), record);
            }
        }
        storage
    }

    pub(crate) fn accounts_snapshot(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.accounts.iter().map(|e| e.value().clone()).collect();
        accounts.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        accounts
    }

    pub(crate) fn sessions_snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.token.cmp(&b.token)));
        sessions
    }

    /// Private copy of the accounts, for staging a change before it is committed
    pub(crate) fn detached_accounts(&self) -> MemoryStorage {
        Self::from_parts(self.accounts_snapshot(), Vec::new(), Vec::new())
    }

    /// Private copy of the sessions, for staging a change before it is committed
    pub(crate) fn detached_sessions(&self) -> MemoryStorage {
        Self::from_parts(Vec::new(), self.sessions_snapshot(), Vec::new())
    }

    /// Current settings rows merged with `batch`, without committing
    pub(crate) fn settings_with(&self, batch: &[SettingRecord]) -> Vec<SettingRecord> {
        let mut map = self.settings.lock().clone();
        for record in batch {
            map.insert(record.key.clone(), record.clone());
        }
        map.into_values().collect()
    }

    /// Number of stored sessions, expired or not
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStorage {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self.identifiers.get(identifier).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|e| e.value().clone()))
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|e| e.value().clone()))
    }

    async fn insert(&self, account: Account) -> Result<(), StoreError> {
        let mut claimed = false;
        self.identifiers
            .entry(account.identifier.clone())
            .or_insert_with(|| {
                claimed = true;
                account.id
            });

        if !claimed {
            return Err(StoreError::Duplicate(account.identifier));
        }

        self.accounts.insert(account.id, account);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut account: Account,
    ) -> Result<bool, StoreError> {
        let Some(mut stored) = self.accounts.get_mut(&account.id) else {
            return Err(StoreError::NotFound(account.id.to_string()));
        };

        if stored.version != expected_version {
            return Ok(false);
        }

        account.version = expected_version + 1;
        *stored = account;
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for MemoryStorage {
    async fn insert(&self, session: Session) -> Result<(), StoreError> {
        let mut claimed = false;
        let token = session.token.clone();
        self.sessions.entry(token.clone()).or_insert_with(|| {
            claimed = true;
            session
        });

        if claimed {
            Ok(())
        } else {
            Err(StoreError::Duplicate(format!("session {}", redact(&token))))
        }
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(token).map(|e| e.value().clone()))
    }

    async fn touch(
        &self,
        token: &str,
        at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let Some(mut session) = self.sessions.get_mut(token) else {
            return Ok(None);
        };

        if !session.revoked && !session.is_expired_at(at) && at >= session.last_activity_at {
            session.last_activity_at = at;
            session.expires_at = expires_at;
        }

        Ok(Some(session.value().clone()))
    }

    async fn revoke(&self, token: &str) -> Result<bool, StoreError> {
        match self.sessions.get_mut(token) {
            Some(mut session) => {
                session.revoked = true;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn revoke_all(
        &self,
        account_id: AccountId,
        except: Option<&str>,
    ) -> Result<usize, StoreError> {
        let mut revoked = 0;
        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.account_id != account_id || session.revoked {
                continue;
            }
            if except == Some(session.token.as_str()) {
                continue;
            }
            session.revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = session.expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[async_trait]
impl SettingsRepository for MemoryStorage {
    async fn load(&self) -> Result<Vec<SettingRecord>, StoreError> {
        Ok(self.settings.lock().values().cloned().collect())
    }

    async fn save_batch(&self, records: &[SettingRecord]) -> Result<(), StoreError> {
        let mut map = self.settings.lock();
        for record in records {
            map.insert(record.key.clone(), record.clone());
        }
        Ok(())
    }
}

/// Tokens never appear whole in errors or logs
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}…")
}
