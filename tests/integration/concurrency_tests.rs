use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;
use warden_backend::{
    auth::{AuthGateway, LoginOutcome, SessionManager},
    clock::{Clock, ManualClock},
    error::AppError,
    models::{Account, AccountId, SessionScope},
    settings::{SecuritySettings, SettingsStore},
    storage::{AccountStore, MemoryStorage, SessionStore, StoreError},
};

use crate::test_utils::{setup_test_env, without_first_login_rotation, INITIAL_SECRET};

/// Account store that holds every identifier lookup until released
struct PausingAccounts {
    inner: MemoryStorage,
    reached: Notify,
    release: Notify,
}

#[async_trait]
impl AccountStore for PausingAccounts {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        let found = self.inner.find_by_identifier(identifier).await;
        self.reached.notify_one();
        self.release.notified().await;
        found
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        AccountStore::get(&self.inner, id).await
    }

    async fn insert(&self, account: Account) -> Result<(), StoreError> {
        AccountStore::insert(&self.inner, account).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        account: Account,
    ) -> Result<bool, StoreError> {
        self.inner.compare_and_swap(expected_version, account).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_set_during_login_refuses_the_right_password() {
    let storage = MemoryStorage::new();
    let clock = ManualClock::default();
    let settings = Arc::new(
        SettingsStore::load(
            Arc::new(storage.clone()),
            SecuritySettings {
                max_failed_login_attempts: 3,
                ..without_first_login_rotation()
            },
            Arc::new(clock.clone()),
        )
        .await
        .unwrap(),
    );
    let sessions = Arc::new(SessionManager::new(Arc::new(storage.clone()), settings.clone()));
    let accounts = Arc::new(PausingAccounts {
        inner: storage.clone(),
        reached: Notify::new(),
        release: Notify::new(),
    });
    let gateway = Arc::new(AuthGateway::new(
        accounts.clone(),
        sessions,
        settings,
        Arc::new(clock.clone()),
    ));
    let account = gateway.provision_account("victim", INITIAL_SECRET).await.unwrap();

    let login = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.login("victim", INITIAL_SECRET).await }
    });

    // the login has read the unlocked account; lock it before it continues
    accounts.reached.notified().await;
    for _ in 0..3 {
        gateway.tracker().on_failure(account.id, clock.now()).await.unwrap();
    }
    let locked_until = AccountStore::get(&storage, account.id)
        .await
        .unwrap()
        .unwrap()
        .locked_until
        .unwrap();
    accounts.release.notify_one();

    match login.await.unwrap().unwrap_err() {
        AppError::AccountLocked { retry_after, .. } => assert_eq!(retry_after, locked_until),
        other => panic!("expected AccountLocked, got {other:?}"),
    }
    let stored = AccountStore::get(&storage, account.id).await.unwrap().unwrap();
    assert_eq!(stored.locked_until, Some(locked_until));
    assert_eq!(storage.session_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_submitted_logins_both_succeed() {
    let env = setup_test_env(without_first_login_rotation()).await;
    let account = env.provision("yusuf").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gateway = env.state.gateway.clone();
        handles.push(tokio::spawn(async move {
            gateway.login("yusuf", INITIAL_SECRET).await
        }));
    }

    let mut tokens = HashSet::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            LoginOutcome::Authenticated { session, .. } => {
                tokens.insert(session.token);
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(tokens.len(), 8);
    assert_eq!(env.storage.session_count(), 8);

    // nothing to reset, so no login rewrote the account
    assert_eq!(env.account("yusuf").await.version, account.version);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_wrong_guesses_lock_once() {
    let env = setup_test_env(SecuritySettings {
        max_failed_login_attempts: 5,
        ..without_first_login_rotation()
    })
    .await;
    env.provision("zara").await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let gateway = env.state.gateway.clone();
        handles.push(tokio::spawn(async move {
            gateway.login("zara", "Wrong-Pa55").await
        }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(
            matches!(err, AppError::InvalidCredentials | AppError::AccountLocked { .. }),
            "unexpected error: {err:?}"
        );
    }

    let account = env.account("zara").await;
    assert_eq!(account.failed_login_count, 0);
    assert_eq!(
        account.locked_until,
        Some(env.clock.now() + Duration::minutes(30))
    );
    assert!(matches!(
        env.state.gateway.login("zara", INITIAL_SECRET).await.unwrap_err(),
        AppError::AccountLocked { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_validation_only_moves_the_deadline_forward() {
    let env = setup_test_env(without_first_login_rotation()).await;
    let account = env.provision("abel").await;
    let start = env.clock.now();
    let session = env
        .state
        .sessions
        .create(account.id, SessionScope::Full, start)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 1..=16 {
        let sessions = env.state.sessions.clone();
        let token = session.token.clone();
        handles.push(tokio::spawn(async move {
            sessions.validate(&token, start + Duration::seconds(i)).await
        }));
    }
    for handle in handles {
        let seen = handle.await.unwrap().unwrap();
        assert!(seen.expires_at >= start + Duration::minutes(30));
    }

    let last = start + Duration::seconds(16);
    let stored = SessionStore::get(&env.storage, &session.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_activity_at, last);
    assert_eq!(stored.expires_at, last + Duration::minutes(30));
}
