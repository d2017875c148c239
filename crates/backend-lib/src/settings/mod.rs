//! Security policy settings.
//!
//! Settings cross the wire as `{key, value}` strings. They are parsed here into
//! a closed set of [`SettingKey`]s and typed [`SettingValue`]s; nothing past
//! this module ever looks at the raw strings.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FieldError, ValidationError};

mod store;

pub use store::{parse_batch, SettingsStore};

/// Every configurable security setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    SessionTimeoutMinutes,
    PasswordExpiryDays,
    PasswordMinLength,
    RequirePasswordChangeOnFirstLogin,
    MaxFailedLoginAttempts,
    AccountLockDurationMinutes,
}

/// Declared type and domain of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Integer { min: u32, max: u32 },
    Boolean,
}

/// A typed setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    Integer(u32),
    Boolean(bool),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Integer(n) => write!(f, "{n}"),
            SettingValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::SessionTimeoutMinutes,
        SettingKey::PasswordExpiryDays,
        SettingKey::PasswordMinLength,
        SettingKey::RequirePasswordChangeOnFirstLogin,
        SettingKey::MaxFailedLoginAttempts,
        SettingKey::AccountLockDurationMinutes,
    ];

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::SessionTimeoutMinutes => "session_timeout_minutes",
            SettingKey::PasswordExpiryDays => "password_expiry_days",
            SettingKey::PasswordMinLength => "password_min_length",
            SettingKey::RequirePasswordChangeOnFirstLogin => {
                "require_password_change_on_first_login"
            },
            SettingKey::MaxFailedLoginAttempts => "max_failed_login_attempts",
            SettingKey::AccountLockDurationMinutes => "account_lock_duration_minutes",
        }
    }

    pub fn kind(self) -> SettingKind {
        match self {
            SettingKey::SessionTimeoutMinutes => SettingKind::Integer { min: 1, max: 1440 },
            SettingKey::PasswordExpiryDays => SettingKind::Integer { min: 0, max: 365 },
            SettingKey::PasswordMinLength => SettingKind::Integer { min: 6, max: 32 },
            SettingKey::RequirePasswordChangeOnFirstLogin => SettingKind::Boolean,
            SettingKey::MaxFailedLoginAttempts => SettingKind::Integer { min: 1, max: 100 },
            SettingKey::AccountLockDurationMinutes => SettingKind::Integer { min: 1, max: 10080 },
        }
    }

    /// Coerce a raw wire value according to this key's declared type
    pub fn parse_value(self, raw: &str) -> Result<SettingValue, FieldError> {
        match self.kind() {
            SettingKind::Boolean => match raw {
                "true" => Ok(SettingValue::Boolean(true)),
                "false" => Ok(SettingValue::Boolean(false)),
                _ => Err(FieldError::new(
                    self.as_str(),
                    format!("expected \"true\" or \"false\", got {raw:?}"),
                )),
            },
            SettingKind::Integer { .. } => {
                let n: i64 = raw.parse().map_err(|_| {
                    FieldError::new(self.as_str(), format!("expected an integer, got {raw:?}"))
                })?;
                self.check(n)
            },
        }
    }

    /// Domain check for an integer candidate
    fn check(self, n: i64) -> Result<SettingValue, FieldError> {
        match self.kind() {
            SettingKind::Integer { min, max } if n >= i64::from(min) && n <= i64::from(max) => {
                // in range, so it fits
                Ok(SettingValue::Integer(n as u32))
            },
            SettingKind::Integer { min, max } => Err(FieldError::new(
                self.as_str(),
                format!("must be between {min} and {max}, got {n}"),
            )),
            SettingKind::Boolean => Err(FieldError::new(self.as_str(), "expected a boolean")),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| FieldError::new(s, "unknown setting"))
    }
}

/// The security policy in force
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub session_timeout_minutes: u32,
    /// 0 means passwords never expire
    pub password_expiry_days: u32,
    pub password_min_length: u32,
    pub require_password_change_on_first_login: bool,
    pub max_failed_login_attempts: u32,
    pub account_lock_duration_minutes: u32,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            session_timeout_minutes: 30,
            password_expiry_days: 90,
            password_min_length: 8,
            require_password_change_on_first_login: true,
            max_failed_login_attempts: 5,
            account_lock_duration_minutes: 30,
        }
    }
}

impl SecuritySettings {
    pub fn get(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::SessionTimeoutMinutes => SettingValue::Integer(self.session_timeout_minutes),
            SettingKey::PasswordExpiryDays => SettingValue::Integer(self.password_expiry_days),
            SettingKey::PasswordMinLength => SettingValue::Integer(self.password_min_length),
            SettingKey::RequirePasswordChangeOnFirstLogin => {
                SettingValue::Boolean(self.require_password_change_on_first_login)
            },
            SettingKey::MaxFailedLoginAttempts => {
                SettingValue::Integer(self.max_failed_login_attempts)
            },
            SettingKey::AccountLockDurationMinutes => {
                SettingValue::Integer(self.account_lock_duration_minutes)
            },
        }
    }

    /// Apply a typed value, re-checking its domain
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<(), FieldError> {
        let checked = |n: u32| key.check(i64::from(n)).map(|_| n);
        match (key, value) {
            (SettingKey::SessionTimeoutMinutes, SettingValue::Integer(n)) => {
                self.session_timeout_minutes = checked(n)?;
            },
            (SettingKey::PasswordExpiryDays, SettingValue::Integer(n)) => {
                self.password_expiry_days = checked(n)?;
            },
            (SettingKey::PasswordMinLength, SettingValue::Integer(n)) => {
                self.password_min_length = checked(n)?;
            },
            (SettingKey::RequirePasswordChangeOnFirstLogin, SettingValue::Boolean(b)) => {
                self.require_password_change_on_first_login = b;
            },
            (SettingKey::MaxFailedLoginAttempts, SettingValue::Integer(n)) => {
                self.max_failed_login_attempts = checked(n)?;
            },
            (SettingKey::AccountLockDurationMinutes, SettingValue::Integer(n)) => {
                self.account_lock_duration_minutes = checked(n)?;
            },
            (key, _) => {
                return Err(FieldError::new(key.as_str(), "value has the wrong type"));
            },
        }
        Ok(())
    }

    /// Check every field against its declared domain
    pub fn validate(&self) -> Result<(), ValidationError> {
        let errors: Vec<FieldError> = SettingKey::ALL
            .into_iter()
            .filter_map(|key| match self.get(key) {
                SettingValue::Integer(n) => key.check(i64::from(n)).err(),
                SettingValue::Boolean(_) => None,
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.session_timeout_minutes))
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.account_lock_duration_minutes))
    }

    /// `None` when passwords never expire
    pub fn password_max_age(&self) -> Option<Duration> {
        (self.password_expiry_days > 0).then(|| Duration::days(i64::from(self.password_expiry_days)))
    }
}
