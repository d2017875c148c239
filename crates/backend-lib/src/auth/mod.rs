// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod gateway;
pub mod lockout;
pub mod password;
pub mod session;
pub mod token_generator;

pub use gateway::{normalize_identifier, AccountContext, AuthGateway, LoginOutcome};
pub use lockout::{FailureOutcome, LoginAttemptTracker, MAX_CAS_RETRIES};
pub use password::{
    hash_password, verify_password, CompositionRules, PasswordPolicy, PasswordRule, PolicyError,
    COMPOSITION_RULES, MAX_PASSWORD_LENGTH,
};
pub use session::{SessionManager, SweeperHandle};
