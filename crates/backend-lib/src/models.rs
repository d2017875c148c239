// ============================
// crates/backend-lib/src/models.rs
// ============================
//! Security records: accounts and sessions.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use warden_common::AccountSummary;

/// Account identifier
pub type AccountId = Uuid;

/// A credential-bearing account as seen by the security engine.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Login name, stored lowercased
    pub identifier: String,
    /// PHC-formatted password hash
    pub password_hash: String,
    pub password_changed_at: DateTime<Utc>,
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    /// Set while the account still uses its provisioned credential
    pub require_password_change: bool,
    pub created_at: DateTime<Utc>,
    /// Bumped by the store on every successful compare-and-swap
    #[serde(default)]
    pub version: u64,
}

impl Account {
    pub fn new(
        identifier: String,
        password_hash: String,
        require_password_change: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier,
            password_hash,
            password_changed_at: now,
            failed_login_count: 0,
            locked_until: None,
            require_password_change,
            created_at: now,
            version: 0,
        }
    }

    /// Lock deadline if the account is locked at `now`
    pub fn locked_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| now < *until)
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            identifier: self.identifier.clone(),
            password_changed_at: self.password_changed_at,
        }
    }
}

// Keep the hash out of logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("password_changed_at", &self.password_changed_at)
            .field("failed_login_count", &self.failed_login_count)
            .field("locked_until", &self.locked_until)
            .field("require_password_change", &self.require_password_change)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// What a session token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// Normal authenticated session
    Full,
    /// Only valid for changing the account's password
    PasswordChange,
}

/// A login session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub account_id: AccountId,
    pub scope: SessionScope,
    pub issued_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    /// A session is dead once its deadline is reached
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
