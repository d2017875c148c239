// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing, verification and policy.
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use rand::RngCore;
use scrypt::Scrypt;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::AppError;
use crate::models::Account;
use crate::settings::SecuritySettings;

/// Hard upper bound on password length
pub const MAX_PASSWORD_LENGTH: usize = 128;

const SALT_LEN: usize = 16;

/// Character-class requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionRules {
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

/// Composition rules in force. Not part of the configurable settings.
pub const COMPOSITION_RULES: CompositionRules = CompositionRules {
    require_uppercase: true,
    require_lowercase: true,
    require_digit: true,
    require_special: true,
};

impl Default for CompositionRules {
    fn default() -> Self {
        COMPOSITION_RULES
    }
}

/// A single password rule a candidate can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    MinLength(usize),
    MaxLength(usize),
    Uppercase,
    Lowercase,
    Digit,
    Special,
    /// New password equals the one being replaced
    ReusesCurrent,
}

impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordRule::MinLength(n) => write!(f, "must be at least {n} characters"),
            PasswordRule::MaxLength(n) => write!(f, "must be at most {n} characters"),
            PasswordRule::Uppercase => f.write_str("must contain an uppercase letter"),
            PasswordRule::Lowercase => f.write_str("must contain a lowercase letter"),
            PasswordRule::Digit => f.write_str("must contain a digit"),
            PasswordRule::Special => f.write_str("must contain a special character"),
            PasswordRule::ReusesCurrent => f.write_str("must differ from the current password"),
        }
    }
}

/// Every rule the candidate failed, not just the first
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} unmet rule(s)", .unmet_rules.len())]
pub struct PolicyError {
    pub unmet_rules: Vec<PasswordRule>,
}

/// Validates candidate passwords and decides when a password has expired
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordPolicy {
    composition: CompositionRules,
}

impl PasswordPolicy {
    pub fn new(composition: CompositionRules) -> Self {
        Self { composition }
    }

    /// Evaluate every rule and report all violations together
    pub fn validate(&self, candidate: &str, settings: &SecuritySettings) -> Result<(), PolicyError> {
        let mut unmet = Vec::new();
        let length = candidate.chars().count();
        let min_length = settings.password_min_length as usize;

        if length < min_length {
            unmet.push(PasswordRule::MinLength(min_length));
        }
        if length > MAX_PASSWORD_LENGTH {
            unmet.push(PasswordRule::MaxLength(MAX_PASSWORD_LENGTH));
        }
        if self.composition.require_uppercase && !candidate.chars().any(char::is_uppercase) {
            unmet.push(PasswordRule::Uppercase);
        }
        if self.composition.require_lowercase && !candidate.chars().any(char::is_lowercase) {
            unmet.push(PasswordRule::Lowercase);
        }
        if self.composition.require_digit && !candidate.chars().any(|c| c.is_ascii_digit()) {
            unmet.push(PasswordRule::Digit);
        }
        if self.composition.require_special && !candidate.chars().any(|c| !c.is_alphanumeric()) {
            unmet.push(PasswordRule::Special);
        }

        if unmet.is_empty() {
            Ok(())
        } else {
            Err(PolicyError { unmet_rules: unmet })
        }
    }

    /// When the account's password stops being acceptable, if ever
    pub fn expires_at(&self, account: &Account, settings: &SecuritySettings) -> Option<DateTime<Utc>> {
        settings
            .password_max_age()
            .map(|max_age| account.password_changed_at + max_age)
    }

    /// Always false when `password_expiry_days` is 0
    pub fn is_expired(&self, account: &Account, settings: &SecuritySettings, now: DateTime<Utc>) -> bool {
        self.expires_at(account, settings)
            .is_some_and(|deadline| now >= deadline)
    }
}

/// Hash a password with Argon2id and a random salt
pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;

    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?
        .to_string();
    Ok(hash)
}

/// Verify a password against an Argon2 or (legacy) scrypt PHC hash.
/// Malformed hashes never verify.
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    parsed_hash
        .verify_password(&[&Argon2::default(), &Scrypt], plain.as_bytes())
        .is_ok()
}

// Verified against when the identifier is unknown, so both paths cost one hash check.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_password("warden-dummy-secret").ok());

/// Burn the same work as a real verification
pub(crate) fn verify_dummy(plain: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(hash, plain);
    }
}
