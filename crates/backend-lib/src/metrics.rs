// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
pub const LOGIN_SUCCEEDED: &str = "auth.login.succeeded";
pub const LOGIN_FAILED: &str = "auth.login.failed";
pub const LOGIN_REJECTED_LOCKED: &str = "auth.login.rejected_locked";
pub const ACCOUNT_LOCKED: &str = "auth.account.locked";
pub const ACCOUNT_UNLOCKED: &str = "auth.account.unlocked";
pub const ACCOUNT_PROVISIONED: &str = "auth.account.provisioned";
pub const PASSWORD_CHANGED: &str = "auth.password.changed";
pub const SESSIONS_CREATED: &str = "session.created";
pub const SESSIONS_REVOKED: &str = "session.revoked";
pub const SESSIONS_SWEPT: &str = "session.swept";
pub const SETTINGS_UPDATED: &str = "settings.updated";
