// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Warden: account-security and session-lifecycle engine.
//!
//! Enforces a configurable password policy, sliding session expiry,
//! failed-login lockout and forced password rotation. Routing and transport
//! belong to the host; [`middleware::require_session`] is the only HTTP
//! surface provided.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod settings;
pub mod storage;

use std::sync::Arc;

use crate::auth::{AuthGateway, SessionManager, SweeperHandle};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::AppError;
use crate::settings::SettingsStore;
use crate::storage::{AccountStore, SessionStore, SettingsRepository};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Login, session and password operations
    pub gateway: Arc<AuthGateway>,
    /// Session manager, also driven by the sweeper
    pub sessions: Arc<SessionManager>,
    /// Security policy in force
    pub settings: Arc<SettingsStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire every component over one storage backend
    pub async fn new<S>(storage: S, config: &Config) -> Result<Self, AppError>
    where
        S: AccountStore + SessionStore + SettingsRepository + 'static,
    {
        Self::with_clock(storage, config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock<S>(
        storage: S,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError>
    where
        S: AccountStore + SessionStore + SettingsRepository + 'static,
    {
        let storage = Arc::new(storage);
        let settings = Arc::new(
            SettingsStore::load(storage.clone(), config.security.clone(), clock.clone()).await?,
        );
        let sessions = Arc::new(SessionManager::new(storage.clone(), settings.clone()));
        let gateway = Arc::new(AuthGateway::new(
            storage,
            sessions.clone(),
            settings.clone(),
            clock.clone(),
        ));

        Ok(Self {
            gateway,
            sessions,
            settings,
            clock,
        })
    }

    /// Start the periodic session sweep
    pub fn spawn_sweeper(&self, config: &Config) -> SweeperHandle {
        self.sessions
            .spawn_sweeper(config.sweep_interval(), self.clock.clone())
    }
}
