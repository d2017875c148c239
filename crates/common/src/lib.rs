// ================
// common/src/lib.rs
// ================
//! Wire types shared between the Warden engine, its HTTP glue and the admin CLI.
//!
//! Everything here is plain data: settings travel as strings and are only
//! turned into typed values inside the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of a bulk settings update, exactly as received from a client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SettingUpdate {
    /// Setting key, e.g. `session_timeout_minutes`
    pub key: String,
    /// Raw value; coerced per the key's declared type
    pub value: String,
}

impl SettingUpdate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A setting as shown to administrators, with its audit trail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingView {
    pub key: String,
    pub value: String,
    /// Who last changed the value (`None` while it is still the seeded default)
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Login request body
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: String,
}

/// Public view of an account returned alongside a token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: Uuid,
    pub identifier: String,
    pub password_changed_at: DateTime<Utc>,
}

/// Why a login was routed to the change-password flow
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PasswordChangeReason {
    /// The account still uses the credential it was provisioned with
    FirstLogin,
    /// `password_expiry_days` elapsed since the last change
    Expired,
}

/// Successful outcomes of a login
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LoginResponse {
    /// A full session was issued
    Authenticated {
        token: String,
        expires_at: DateTime<Utc>,
        account: AccountSummary,
    },
    /// The token is only good for the change-password operation
    PasswordChangeRequired {
        token: String,
        expires_at: DateTime<Utc>,
        reason: PasswordChangeReason,
        account: AccountSummary,
    },
}

/// Response to a refresh
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Change-password request body
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// Omitted only in the first-login flow
    #[serde(default)]
    pub current_password: Option<String>,
    pub new_password: String,
}

/// Body of every error response
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    /// Field-level detail for validation failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}
