use warden_backend::{
    clock::Clock,
    error::AppError,
    settings::{parse_batch, SecuritySettings, SettingKey, SettingValue},
};
use warden_common::SettingUpdate;

use crate::test_utils::setup_test_env;

#[tokio::test]
async fn test_invalid_entry_rejects_whole_batch() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let before = env.state.gateway.settings();

    let err = env
        .state
        .gateway
        .update_settings(
            &[
                SettingUpdate::new("session_timeout_minutes", "60"),
                SettingUpdate::new("password_min_length", "-1"),
                SettingUpdate::new("max_failed_login_attempts", "3"),
            ],
            "admin",
        )
        .await
        .unwrap_err();

    match err {
        AppError::Validation(v) => {
            assert_eq!(v.errors.len(), 1);
            assert!(v.has_field("password_min_length"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(env.state.gateway.settings(), before);
    assert_eq!(env.state.settings.current().session_timeout_minutes, 30);
}

#[tokio::test]
async fn test_every_offending_field_is_reported() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let err = env
        .state
        .gateway
        .update_settings(
            &[
                SettingUpdate::new("session_timeout_minutes", "0"),
                SettingUpdate::new("require_password_change_on_first_login", "True"),
                SettingUpdate::new("password_expiry_days", "many"),
                SettingUpdate::new("lockout_policy", "strict"),
            ],
            "admin",
        )
        .await
        .unwrap_err();

    match err {
        AppError::Validation(v) => assert_eq!(v.errors.len(), 4),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_update_is_visible_to_readers_with_audit() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let now = env.clock.now();

    let views = env
        .state
        .gateway
        .update_settings(&[SettingUpdate::new("account_lock_duration_minutes", "60")], "ops")
        .await
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].value, "60");
    assert_eq!(views[0].updated_by.as_deref(), Some("ops"));
    assert_eq!(views[0].updated_at, Some(now));

    assert_eq!(env.state.settings.current().account_lock_duration_minutes, 60);
    let view = env
        .state
        .settings
        .get_by_key("account_lock_duration_minutes")
        .unwrap();
    assert_eq!(view.updated_by.as_deref(), Some("ops"));
}

#[tokio::test]
async fn test_updater_identity_is_required() {
    let env = setup_test_env(SecuritySettings::default()).await;
    let err = env
        .state
        .settings
        .update_one("password_expiry_days", "0", "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn test_boundaries_of_every_integer_domain() {
    let cases = [
        (SettingKey::SessionTimeoutMinutes, 1, 1440),
        (SettingKey::PasswordExpiryDays, 0, 365),
        (SettingKey::PasswordMinLength, 6, 32),
        (SettingKey::MaxFailedLoginAttempts, 1, 100),
        (SettingKey::AccountLockDurationMinutes, 1, 10080),
    ];
    for (key, min, max) in cases {
        assert_eq!(
            key.parse_value(&min.to_string()).unwrap(),
            SettingValue::Integer(min)
        );
        assert_eq!(
            key.parse_value(&max.to_string()).unwrap(),
            SettingValue::Integer(max)
        );
        assert!(key.parse_value(&(i64::from(min) - 1).to_string()).is_err());
        assert!(key.parse_value(&(max + 1).to_string()).is_err());
    }
}

#[test]
fn test_later_duplicate_wins() {
    let parsed = parse_batch(&[
        SettingUpdate::new("password_min_length", "10"),
        SettingUpdate::new("password_min_length", "12"),
    ])
    .unwrap();
    assert_eq!(
        parsed,
        vec![(SettingKey::PasswordMinLength, SettingValue::Integer(12))]
    );
}
