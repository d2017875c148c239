use chrono::Duration;
use uuid::Uuid;
use warden_backend::{
    clock::Clock,
    error::AppError,
    models::SessionScope,
    settings::SecuritySettings,
    storage::SessionStore,
};

use crate::test_utils::setup_test_env;

#[tokio::test]
async fn test_touch_sets_deadline_from_touch_time() {
    for timeout in [1u32, 30, 1440] {
        let env = setup_test_env(SecuritySettings {
            session_timeout_minutes: timeout,
            ..SecuritySettings::default()
        })
        .await;
        let sessions = &env.state.sessions;
        let now = env.clock.now();
        let session = sessions.create(Uuid::new_v4(), SessionScope::Full, now).await.unwrap();

        let touch_at = now + Duration::seconds(30);
        let touched = sessions.validate(&session.token, touch_at).await.unwrap();
        assert_eq!(
            touched.expires_at,
            touch_at + Duration::minutes(i64::from(timeout))
        );
    }
}

#[tokio::test]
async fn test_idle_session_expires() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let sessions = &env.state.sessions;
    let now = env.clock.now();
    let session = sessions.create(Uuid::new_v4(), SessionScope::Full, now).await.unwrap();

    let err = sessions
        .validate(&session.token, now + Duration::minutes(31))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SessionExpired));
}

#[tokio::test]
async fn test_deadline_is_exclusive() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let sessions = &env.state.sessions;
    let now = env.clock.now();
    let session = sessions.create(Uuid::new_v4(), SessionScope::Full, now).await.unwrap();

    let err = sessions.validate(&session.token, session.expires_at).await.unwrap_err();
    assert!(matches!(err, AppError::SessionExpired));
}

#[tokio::test]
async fn test_sweep_respects_the_boundary() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let sessions = &env.state.sessions;
    let now = env.clock.now();
    let owner = Uuid::new_v4();

    // expires exactly at `now`
    let on_boundary = sessions
        .create(owner, SessionScope::Full, now - Duration::minutes(30))
        .await
        .unwrap();
    let before = sessions
        .create(owner, SessionScope::Full, now - Duration::minutes(31))
        .await
        .unwrap();
    let live = sessions.create(owner, SessionScope::Full, now).await.unwrap();

    assert_eq!(sessions.sweep_expired(now).await.unwrap(), 1);
    assert_eq!(sessions.sweep_expired(now).await.unwrap(), 0);

    assert!(env.storage.get(&before.token).await.unwrap().is_none());
    assert!(env.storage.get(&on_boundary.token).await.unwrap().is_some());
    assert!(env.storage.get(&live.token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_revoke_all_leaves_other_accounts_alone() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let sessions = &env.state.sessions;
    let now = env.clock.now();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let keep = sessions.create(a, SessionScope::Full, now).await.unwrap();
    sessions.create(a, SessionScope::Full, now).await.unwrap();
    sessions.create(a, SessionScope::PasswordChange, now).await.unwrap();
    let other = sessions.create(b, SessionScope::Full, now).await.unwrap();

    assert_eq!(sessions.revoke_all(a, Some(&keep.token)).await.unwrap(), 2);
    assert!(sessions.validate(&keep.token, now).await.is_ok());
    assert!(sessions.validate(&other.token, now).await.is_ok());
    // already revoked sessions are not counted twice
    assert_eq!(sessions.revoke_all(a, Some(&keep.token)).await.unwrap(), 0);
}
