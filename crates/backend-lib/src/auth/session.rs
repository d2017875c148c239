// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Session issuing, sliding renewal, revocation and sweeping.
use chrono::{DateTime, Utc};
use metrics::counter;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use super::token_generator::generate_secure_token;
use crate::clock::Clock;
use crate::error::AppError;
use crate::metrics::{SESSIONS_CREATED, SESSIONS_REVOKED, SESSIONS_SWEPT};
use crate::models::{AccountId, Session, SessionScope};
use crate::settings::SettingsStore;
use crate::storage::{redact, SessionStore};

/// Session manager over a [`SessionStore`]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    settings: Arc<SettingsStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, settings: Arc<SettingsStore>) -> Self {
        Self { store, settings }
    }

    /// Issue a new session for an account
    pub async fn create(
        &self,
        account_id: AccountId,
        scope: SessionScope,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let timeout = self.settings.current().session_timeout();
        let session = Session {
            token: generate_secure_token(),
            account_id,
            scope,
            issued_at: now,
            last_activity_at: now,
            expires_at: now + timeout,
            revoked: false,
        };

        self.store.insert(session.clone()).await?;
        debug!(%account_id, ?scope, token = %redact(&session.token), "session created");
        counter!(SESSIONS_CREATED).increment(1);

        Ok(session)
    }

    /// Check a token and slide its deadline to `now + timeout`
    pub async fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Session, AppError> {
        let timeout = self.settings.current().session_timeout();
        let session = self
            .store
            .touch(token, now, now + timeout)
            .await?
            .ok_or(AppError::SessionNotFound)?;

        if session.revoked {
            return Err(AppError::SessionRevoked);
        }
        if session.is_expired_at(now) {
            return Err(AppError::SessionExpired);
        }
        Ok(session)
    }

    /// Revoke a single session
    pub async fn revoke(&self, token: &str) -> Result<(), AppError> {
        if !self.store.revoke(token).await? {
            return Err(AppError::SessionNotFound);
        }
        debug!(token = %redact(token), "session revoked");
        counter!(SESSIONS_REVOKED).increment(1);
        Ok(())
    }

    /// Revoke every live session of an account, optionally sparing one token
    pub async fn revoke_all(
        &self,
        account_id: AccountId,
        except: Option<&str>,
    ) -> Result<usize, AppError> {
        let revoked = self.store.revoke_all(account_id, except).await?;
        if revoked > 0 {
            debug!(%account_id, revoked, "sessions revoked");
            counter!(SESSIONS_REVOKED).increment(revoked as u64);
        }
        Ok(revoked)
    }

    /// Delete every session whose deadline is before `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let removed = self.store.remove_expired(now).await?;
        if removed > 0 {
            info!(target: "warden::security", removed, "expired sessions swept");
            counter!(SESSIONS_SWEPT).increment(removed as u64);
        }
        Ok(removed)
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` on its own task.
    /// The first sweep happens immediately.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, clock: Arc<dyn Clock>) -> SweeperHandle {
        let manager = Arc::clone(self);
        let period = interval.max(Duration::from_secs(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = manager.sweep_expired(clock.now()).await {
                    warn!(error = %e, "session sweep failed");
                }
            }
        });

        SweeperHandle { task: Some(task) }
    }
}

/// Stops the background sweeper when shut down or dropped
#[derive(Debug)]
pub struct SweeperHandle {
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
