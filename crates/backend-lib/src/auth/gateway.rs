// ============================
// crates/backend-lib/src/auth/gateway.rs
// ============================
//! Entry point for every credential and session operation.
use chrono::{DateTime, Utc};
use metrics::counter;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};
use warden_common::{
    LoginResponse, PasswordChangeReason, RefreshResponse, SettingUpdate, SettingView,
};
use zeroize::Zeroizing;

use super::lockout::{mutate_account, LoginAttemptTracker};
use super::password::{self, PasswordPolicy, PasswordRule, PolicyError};
use super::session::SessionManager;
use crate::clock::Clock;
use crate::error::{AppError, ValidationError};
use crate::metrics::{
    ACCOUNT_PROVISIONED, LOGIN_FAILED, LOGIN_REJECTED_LOCKED, LOGIN_SUCCEEDED, PASSWORD_CHANGED,
};
use crate::models::{Account, AccountId, Session, SessionScope};
use crate::settings::SettingsStore;
use crate::storage::{AccountStore, StoreError};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._@+-]{3,64}$").expect("identifier pattern is valid"));

/// What a successful credential check produced
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// A full session
    Authenticated { session: Session, account: Account },
    /// A session restricted to changing the password
    PasswordChangeRequired {
        session: Session,
        account: Account,
        reason: PasswordChangeReason,
    },
}

impl LoginOutcome {
    pub fn session(&self) -> &Session {
        match self {
            LoginOutcome::Authenticated { session, .. }
            | LoginOutcome::PasswordChangeRequired { session, .. } => session,
        }
    }

    pub fn token(&self) -> &str {
        &self.session().token
    }
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Authenticated { session, account } => LoginResponse::Authenticated {
                token: session.token,
                expires_at: session.expires_at,
                account: account.summary(),
            },
            LoginOutcome::PasswordChangeRequired {
                session,
                account,
                reason,
            } => LoginResponse::PasswordChangeRequired {
                token: session.token,
                expires_at: session.expires_at,
                reason,
                account: account.summary(),
            },
        }
    }
}

impl From<Session> for RefreshResponse {
    fn from(session: Session) -> Self {
        RefreshResponse {
            token: session.token,
            expires_at: session.expires_at,
        }
    }
}

/// The authenticated caller of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub account_id: AccountId,
    pub identifier: String,
    pub session_expires_at: DateTime<Utc>,
}

/// Identifiers are compared trimmed and lowercased
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Authentication gateway: login, refresh, logout, change password and the
/// per-request session check.
pub struct AuthGateway {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<SessionManager>,
    tracker: LoginAttemptTracker,
    settings: Arc<SettingsStore>,
    policy: PasswordPolicy,
    clock: Arc<dyn Clock>,
}

impl AuthGateway {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<SessionManager>,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker: LoginAttemptTracker::new(accounts.clone(), settings.clone()),
            accounts,
            sessions,
            settings,
            policy: PasswordPolicy::default(),
            clock,
        }
    }

    pub fn tracker(&self) -> &LoginAttemptTracker {
        &self.tracker
    }

    /// Check credentials and issue a session.
    ///
    /// Lockout is checked before the password, so a locked account is refused
    /// even with the right password. A wrong password is always reported as
    /// [`AppError::InvalidCredentials`], including the attempt that locks.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginOutcome, AppError> {
        let identifier = normalize_identifier(identifier);
        let secret = Zeroizing::new(secret.to_owned());

        let Some(account) = self.accounts.find_by_identifier(&identifier).await? else {
            verify_dummy_blocking(secret).await?;
            warn!(target: "warden::security", %identifier, "login failed: unknown identifier");
            counter!(LOGIN_FAILED).increment(1);
            return Err(AppError::InvalidCredentials);
        };

        let now = self.clock.now();
        if let Some(retry_after) = account.locked_at(now) {
            return Err(refuse_locked(&account, retry_after, now));
        }

        if !verify_blocking(account.password_hash.clone(), secret).await? {
            let outcome = self.tracker.on_failure(account.id, now).await?;
            warn!(
                target: "warden::security",
                account_id = %account.id,
                %identifier,
                failed_count = outcome.failed_count,
                remaining_attempts = outcome.remaining_attempts,
                "login failed: wrong password"
            );
            counter!(LOGIN_FAILED).increment(1);
            return Err(AppError::InvalidCredentials);
        }

        // failures racing this login may have locked the account meanwhile
        let account = match self.tracker.on_success(account.id, now).await {
            Err(AppError::AccountLocked { retry_after, .. }) => {
                return Err(refuse_locked(&account, retry_after, now));
            },
            other => other?,
        };
        let settings = self.settings.current();

        let reason = if account.require_password_change {
            Some(PasswordChangeReason::FirstLogin)
        } else if self.policy.is_expired(&account, &settings, now) {
            Some(PasswordChangeReason::Expired)
        } else {
            None
        };

        let outcome = match reason {
            Some(reason) => {
                let session = self
                    .sessions
                    .create(account.id, SessionScope::PasswordChange, now)
                    .await?;
                info!(
                    target: "warden::security",
                    account_id = %account.id,
                    %identifier,
                    ?reason,
                    "login accepted: password change required"
                );
                LoginOutcome::PasswordChangeRequired {
                    session,
                    account,
                    reason,
                }
            },
            None => {
                let session = self.sessions.create(account.id, SessionScope::Full, now).await?;
                info!(
                    target: "warden::security",
                    account_id = %account.id,
                    %identifier,
                    "login succeeded"
                );
                LoginOutcome::Authenticated { session, account }
            },
        };
        counter!(LOGIN_SUCCEEDED).increment(1);

        Ok(outcome)
    }

    /// Slide a session's deadline
    pub async fn refresh(&self, token: &str) -> Result<Session, AppError> {
        self.sessions.validate(token, self.clock.now()).await
    }

    /// Revoke only this session
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.sessions.revoke(token).await
    }

    /// Replace the account's password and revoke every other session.
    ///
    /// `current` may be omitted only on a restricted session of an account
    /// that still uses its provisioned credential. A restricted session is
    /// spent once the change succeeds.
    pub async fn change_password(
        &self,
        token: &str,
        current: Option<&str>,
        new_password: &str,
    ) -> Result<(), AppError> {
        let now = self.clock.now();
        let session = self.sessions.validate(token, now).await?;
        let account = self.load_account(session.account_id).await?;

        let first_login =
            account.require_password_change && session.scope == SessionScope::PasswordChange;
        if !first_login {
            let Some(current) = current else {
                return Err(AppError::InvalidCredentials);
            };
            let current = Zeroizing::new(current.to_owned());
            if !verify_blocking(account.password_hash.clone(), current).await? {
                warn!(
                    target: "warden::security",
                    account_id = %account.id,
                    "password change refused: wrong current password"
                );
                return Err(AppError::InvalidCredentials);
            }
        }

        let settings = self.settings.current();
        let mut unmet = match self.policy.validate(new_password, &settings) {
            Ok(()) => Vec::new(),
            Err(err) => err.unmet_rules,
        };
        let candidate = Zeroizing::new(new_password.to_owned());
        if verify_blocking(account.password_hash.clone(), candidate.clone()).await? {
            unmet.push(PasswordRule::ReusesCurrent);
        }
        if !unmet.is_empty() {
            return Err(PolicyError { unmet_rules: unmet }.into());
        }

        let new_hash = hash_blocking(candidate).await?;
        let account = mutate_account(self.accounts.as_ref(), account.id, |account| {
            account.password_hash = new_hash.clone();
            account.password_changed_at = now;
            account.require_password_change = false;
            true
        })
        .await?;

        let except = (session.scope == SessionScope::Full).then_some(token);
        let revoked = self.sessions.revoke_all(account.id, except).await?;

        info!(
            target: "warden::security",
            account_id = %account.id,
            identifier = %account.identifier,
            revoked_sessions = revoked,
            "password changed"
        );
        counter!(PASSWORD_CHANGED).increment(1);
        Ok(())
    }

    /// Per-request check: a live, full-scope session
    pub async fn authenticate(&self, token: &str) -> Result<AccountContext, AppError> {
        let session = self.sessions.validate(token, self.clock.now()).await?;
        if session.scope != SessionScope::Full {
            return Err(AppError::RequiresPasswordChange);
        }
        let account = self.load_account(session.account_id).await?;

        Ok(AccountContext {
            account_id: account.id,
            identifier: account.identifier,
            session_expires_at: session.expires_at,
        })
    }

    /// Create an account with an initial secret
    pub async fn provision_account(
        &self,
        identifier: &str,
        initial_secret: &str,
    ) -> Result<Account, AppError> {
        let identifier = normalize_identifier(identifier);
        if !IDENTIFIER_RE.is_match(&identifier) {
            return Err(ValidationError::single(
                "identifier",
                "must be 3-64 characters of letters, digits or ._@+-",
            )
            .into());
        }

        let settings = self.settings.current();
        self.policy.validate(initial_secret, &settings)?;

        let hash = hash_blocking(Zeroizing::new(initial_secret.to_owned())).await?;
        let account = Account::new(
            identifier,
            hash,
            settings.require_password_change_on_first_login,
            self.clock.now(),
        );

        match self.accounts.insert(account.clone()).await {
            Ok(()) => {},
            Err(StoreError::Duplicate(_)) => {
                return Err(ValidationError::single("identifier", "already taken").into());
            },
            Err(e) => return Err(e.into()),
        }

        info!(
            target: "warden::security",
            account_id = %account.id,
            identifier = %account.identifier,
            require_password_change = account.require_password_change,
            "account provisioned"
        );
        counter!(ACCOUNT_PROVISIONED).increment(1);
        Ok(account)
    }

    /// Administrative unlock by identifier
    pub async fn unlock_account(&self, identifier: &str) -> Result<Account, AppError> {
        let identifier = normalize_identifier(identifier);
        let account = self
            .accounts
            .find_by_identifier(&identifier)
            .await?
            .ok_or_else(|| ValidationError::single("identifier", "unknown account"))?;
        self.tracker.unlock(account.id).await
    }

    pub fn settings(&self) -> Vec<SettingView> {
        self.settings.get_all()
    }

    pub async fn update_settings(
        &self,
        entries: &[SettingUpdate],
        updated_by: &str,
    ) -> Result<Vec<SettingView>, AppError> {
        self.settings.update_many(entries, updated_by).await
    }

    async fn load_account(&self, id: AccountId) -> Result<Account, AppError> {
        let account = self
            .accounts
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(account)
    }
}

fn refuse_locked(account: &Account, retry_after: DateTime<Utc>, now: DateTime<Utc>) -> AppError {
    warn!(
        target: "warden::security",
        account_id = %account.id,
        identifier = %account.identifier,
        locked_until = %retry_after,
        "login refused: account locked"
    );
    counter!(LOGIN_REJECTED_LOCKED).increment(1);
    AppError::locked(retry_after, now)
}

// Argon2 is CPU bound; keep it off the async workers.

async fn verify_blocking(hash: String, plain: Zeroizing<String>) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || password::verify_password(&hash, &plain))
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))
}

async fn verify_dummy_blocking(plain: Zeroizing<String>) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || password::verify_dummy(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))
}

async fn hash_blocking(plain: Zeroizing<String>) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
}
