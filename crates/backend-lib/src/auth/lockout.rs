// ============================
// crates/backend-lib/src/auth/lockout.rs
// ============================
//! Failed-login counting and temporary lockout.
//!
//! Lock expiry is a pure time comparison on `locked_until`; no background job
//! is needed to unlock an account.
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::metrics::{ACCOUNT_LOCKED, ACCOUNT_UNLOCKED};
use crate::models::{Account, AccountId};
use crate::settings::SettingsStore;
use crate::storage::{AccountStore, StoreError};

/// Compare-and-swap attempts before giving up on a contended account
pub const MAX_CAS_RETRIES: usize = 16;

/// Result of recording one failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Consecutive failures including this one
    pub failed_count: u32,
    /// Failures left before the account locks
    pub remaining_attempts: u32,
    /// Set when this failure locked the account
    pub locked_until: Option<DateTime<Utc>>,
}

/// Apply `change` to the stored account under compare-and-swap, retrying on
/// conflicts. `change` returns false when there is nothing to write.
pub(crate) async fn mutate_account<F>(
    accounts: &dyn AccountStore,
    account_id: AccountId,
    mut change: F,
) -> Result<Account, AppError>
where
    F: FnMut(&mut Account) -> bool + Send,
{
    for attempt in 0..MAX_CAS_RETRIES {
        let current = accounts
            .get(account_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(account_id.to_string()))?;

        let mut next = current.clone();
        if !change(&mut next) {
            return Ok(current);
        }

        if accounts.compare_and_swap(current.version, next.clone()).await? {
            next.version = current.version + 1;
            return Ok(next);
        }
        debug!(%account_id, attempt, "account update lost a race, retrying");
    }

    Err(StoreError::Conflict(account_id.to_string()).into())
}

fn clear_failures(account: &mut Account) -> bool {
    if account.failed_login_count == 0 && account.locked_until.is_none() {
        return false;
    }
    account.failed_login_count = 0;
    account.locked_until = None;
    true
}

/// Per-account failure counter and lockout decision
pub struct LoginAttemptTracker {
    accounts: Arc<dyn AccountStore>,
    settings: Arc<SettingsStore>,
}

impl LoginAttemptTracker {
    pub fn new(accounts: Arc<dyn AccountStore>, settings: Arc<SettingsStore>) -> Self {
        Self { accounts, settings }
    }

    /// True iff a lock is set and has not yet passed
    pub fn is_locked(&self, account: &Account, now: DateTime<Utc>) -> bool {
        account.locked_at(now).is_some()
    }

    /// Count one failed login. Reaching the threshold locks the account and
    /// resets the counter; failures while already locked are not counted.
    pub async fn on_failure(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, AppError> {
        let settings = self.settings.current();
        let threshold = settings.max_failed_login_attempts;
        let lock_for = settings.lock_duration();

        let mut outcome = FailureOutcome {
            failed_count: 0,
            remaining_attempts: threshold,
            locked_until: None,
        };

        let account = mutate_account(self.accounts.as_ref(), account_id, |account| {
            if account.locked_at(now).is_some() {
                outcome = FailureOutcome {
                    failed_count: account.failed_login_count,
                    remaining_attempts: 0,
                    locked_until: None,
                };
                return false;
            }

            // a lock that already ran out is cleared by the next failure
            account.locked_until = None;
            let failed = account.failed_login_count.saturating_add(1);

            if failed >= threshold {
                let until = now + lock_for;
                account.locked_until = Some(until);
                account.failed_login_count = 0;
                outcome = FailureOutcome {
                    failed_count: failed,
                    remaining_attempts: 0,
                    locked_until: Some(until),
                };
            } else {
                account.failed_login_count = failed;
                outcome = FailureOutcome {
                    failed_count: failed,
                    remaining_attempts: threshold - failed,
                    locked_until: None,
                };
            }
            true
        })
        .await?;

        if let Some(until) = outcome.locked_until {
            warn!(
                target: "warden::security",
                account_id = %account.id,
                identifier = %account.identifier,
                failed_count = outcome.failed_count,
                locked_until = %until,
                "account locked after repeated login failures"
            );
            counter!(ACCOUNT_LOCKED).increment(1);
        }

        Ok(outcome)
    }

    /// Reset the counter and clear a lapsed lock.
    ///
    /// The lock is checked again against the record being written, so a
    /// lock set by concurrent failures after the caller's own check still
    /// refuses the login.
    pub async fn on_success(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Account, AppError> {
        let mut locked = None;
        let account = mutate_account(self.accounts.as_ref(), account_id, |account| {
            locked = account.locked_at(now);
            if locked.is_some() {
                return false;
            }
            clear_failures(account)
        })
        .await?;

        match locked {
            Some(retry_after) => Err(AppError::locked(retry_after, now)),
            None => Ok(account),
        }
    }

    /// Administrative unlock
    pub async fn unlock(&self, account_id: AccountId) -> Result<Account, AppError> {
        let account = mutate_account(self.accounts.as_ref(), account_id, clear_failures).await?;
        info!(
            target: "warden::security",
            account_id = %account.id,
            identifier = %account.identifier,
            "account unlocked"
        );
        counter!(ACCOUNT_UNLOCKED).increment(1);
        Ok(account)
    }
}
