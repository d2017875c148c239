use chrono::Duration;
use warden_backend::{auth::LoginOutcome, error::AppError, settings::SecuritySettings};
use warden_common::{LoginResponse, PasswordChangeReason};

use crate::test_utils::{setup_test_env, without_first_login_rotation, INITIAL_SECRET};

#[tokio::test]
async fn test_lockout_scenario() {
    let env = setup_test_env(SecuritySettings {
        max_failed_login_attempts: 5,
        account_lock_duration_minutes: 30,
        ..without_first_login_rotation()
    })
    .await;
    env.provision("uma").await;
    let gateway = &env.state.gateway;

    for _ in 0..4 {
        let err = gateway.login("uma", "Wrong-Pa55").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }
    let account = env.account("uma").await;
    assert_eq!(account.failed_login_count, 4);
    assert_eq!(account.locked_until, None);

    // the locking attempt is still reported as bad credentials
    let err = gateway.login("uma", "Wrong-Pa55").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    let err = gateway.login("uma", INITIAL_SECRET).await.unwrap_err();
    match err {
        AppError::AccountLocked {
            retry_after,
            retry_after_secs,
        } => {
            assert_eq!(retry_after, env.account("uma").await.locked_until.unwrap());
            assert_eq!(retry_after_secs, 30 * 60);
        },
        other => panic!("expected AccountLocked, got {other:?}"),
    }

    env.clock.advance(Duration::minutes(29));
    assert!(matches!(
        gateway.login("uma", INITIAL_SECRET).await.unwrap_err(),
        AppError::AccountLocked { .. }
    ));

    env.clock.advance(Duration::minutes(1));
    assert_eq!(env.account("uma").await.failed_login_count, 0);
    let outcome = gateway.login("uma", INITIAL_SECRET).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
    assert_eq!(env.account("uma").await.locked_until, None);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let env = setup_test_env(without_first_login_rotation()).await;
    env.provision("vera").await;

    for _ in 0..3 {
        env.state.gateway.login("vera", "Wrong-Pa55").await.unwrap_err();
    }
    assert_eq!(env.account("vera").await.failed_login_count, 3);

    env.state.gateway.login("vera", INITIAL_SECRET).await.unwrap();
    assert_eq!(env.account("vera").await.failed_login_count, 0);
}

#[tokio::test]
async fn test_admin_unlock_lifts_lock_early() {
    let env = setup_test_env(SecuritySettings {
        max_failed_login_attempts: 1,
        ..without_first_login_rotation()
    })
    .await;
    env.provision("walt").await;

    env.state.gateway.login("walt", "Wrong-Pa55").await.unwrap_err();
    assert!(matches!(
        env.state.gateway.login("walt", INITIAL_SECRET).await.unwrap_err(),
        AppError::AccountLocked { .. }
    ));

    env.state.gateway.unlock_account("WALT").await.unwrap();
    env.state.gateway.login("walt", INITIAL_SECRET).await.unwrap();
}

#[tokio::test]
async fn test_first_login_never_yields_a_full_session() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let account = env.provision("xena").await;
    assert!(account.require_password_change);

    let outcome = env.state.gateway.login("xena", INITIAL_SECRET).await.unwrap();
    let token = outcome.token().to_string();
    match LoginResponse::from(outcome) {
        LoginResponse::PasswordChangeRequired { reason, .. } => {
            assert_eq!(reason, PasswordChangeReason::FirstLogin);
        },
        LoginResponse::Authenticated { .. } => panic!("first login must not authenticate"),
    }

    let err = env.state.gateway.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AppError::RequiresPasswordChange));
}

#[tokio::test]
async fn test_sliding_expiry_through_refresh() {
    let env = setup_test_env(without_first_login_rotation()).await;
    env.provision("yuri").await;
    let outcome = env.state.gateway.login("yuri", INITIAL_SECRET).await.unwrap();
    let token = outcome.token().to_string();

    // stays alive as long as activity arrives within the timeout
    for _ in 0..4 {
        env.clock.advance(Duration::minutes(29));
        let session = env.state.gateway.refresh(&token).await.unwrap();
        assert_eq!(session.token, token);
    }

    env.clock.advance(Duration::minutes(31));
    let err = env.state.gateway.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AppError::SessionExpired));
}

#[tokio::test]
async fn test_logout_revokes_only_that_session() {
    let env = setup_test_env(without_first_login_rotation()).await;
    env.provision("zoe").await;
    let gateway = &env.state.gateway;

    let first = gateway.login("zoe", INITIAL_SECRET).await.unwrap();
    let second = gateway.login("zoe", INITIAL_SECRET).await.unwrap();

    gateway.logout(first.token()).await.unwrap();
    assert!(matches!(
        gateway.authenticate(first.token()).await.unwrap_err(),
        AppError::SessionRevoked
    ));
    assert!(gateway.authenticate(second.token()).await.is_ok());

    assert!(matches!(
        gateway.logout("no-such-token").await.unwrap_err(),
        AppError::SessionNotFound
    ));
}

#[tokio::test]
async fn test_new_timeout_applies_to_new_sessions() {
    let env = setup_test_env(without_first_login_rotation()).await;
    env.provision("abel").await;
    env.state
        .gateway
        .update_settings(
            &[warden_common::SettingUpdate::new("session_timeout_minutes", "5")],
            "admin",
        )
        .await
        .unwrap();

    let outcome = env.state.gateway.login("abel", INITIAL_SECRET).await.unwrap();
    let session = outcome.session();
    assert_eq!(session.expires_at - session.issued_at, Duration::minutes(5));
}
