use tempfile::tempdir;
use warden_backend::{
    auth::LoginOutcome, clock::ManualClock, error::AppError, settings::SecuritySettings,
};
use warden_common::SettingUpdate;

use crate::test_utils::{setup_flat_file_env, without_first_login_rotation, INITIAL_SECRET};

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempdir().unwrap();
    let clock = ManualClock::default();

    let token = {
        let state = setup_flat_file_env(&dir, without_first_login_rotation(), &clock).await;
        state
            .gateway
            .provision_account("gina", INITIAL_SECRET)
            .await
            .unwrap();
        state
            .gateway
            .update_settings(&[SettingUpdate::new("max_failed_login_attempts", "2")], "ops")
            .await
            .unwrap();
        let outcome = state.gateway.login("gina", INITIAL_SECRET).await.unwrap();
        outcome.token().to_string()
    };

    let state = setup_flat_file_env(&dir, without_first_login_rotation(), &clock).await;
    assert_eq!(state.settings.current().max_failed_login_attempts, 2);
    let view = state.settings.get_by_key("max_failed_login_attempts").unwrap();
    assert_eq!(view.updated_by.as_deref(), Some("ops"));

    let context = state.gateway.authenticate(&token).await.unwrap();
    assert_eq!(context.identifier, "gina");

    let outcome = state.gateway.login("gina", INITIAL_SECRET).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
}

#[tokio::test]
async fn test_lock_survives_restart() {
    let dir = tempdir().unwrap();
    let clock = ManualClock::default();
    let settings = SecuritySettings {
        max_failed_login_attempts: 1,
        ..without_first_login_rotation()
    };

    {
        let state = setup_flat_file_env(&dir, settings.clone(), &clock).await;
        state
            .gateway
            .provision_account("hank", INITIAL_SECRET)
            .await
            .unwrap();
        state.gateway.login("hank", "Wrong-Pa55").await.unwrap_err();
    }

    let state = setup_flat_file_env(&dir, settings, &clock).await;
    assert!(matches!(
        state.gateway.login("hank", INITIAL_SECRET).await.unwrap_err(),
        AppError::AccountLocked { .. }
    ));
}

#[tokio::test]
async fn test_rejected_batch_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let clock = ManualClock::default();
    let state = setup_flat_file_env(&dir, SecuritySettings::default(), &clock).await;

    state
        .gateway
        .update_settings(&[SettingUpdate::new("password_min_length", "-1")], "ops")
        .await
        .unwrap_err();

    assert!(!dir.path().join("settings.json").exists());
}
