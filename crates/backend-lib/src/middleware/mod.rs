// crates/backend-lib/src/middleware/mod.rs

//! Axum glue for hosts that put the engine behind HTTP routes.

pub mod auth;

pub use auth::{bearer_token, require_session};
