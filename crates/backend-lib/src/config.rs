// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::settings::SecuritySettings;

/// Default configuration file, looked up in the working directory
pub const CONFIG_FILE: &str = "warden.toml";

/// Environment variable prefix; `__` separates nested keys
pub const ENV_PREFIX: &str = "WARDEN_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the flat-file store
    pub data_dir: PathBuf,
    /// Fallback filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Period of the background session sweep
    pub sweep_interval_secs: u64,
    /// Policy used for keys that were never written to settings persistence
    pub security: SecuritySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            log_json: false,
            sweep_interval_secs: 60 * 60,
            security: SecuritySettings::default(),
        }
    }
}

impl Config {
    /// Defaults, then `warden.toml`, then `WARDEN_*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Same layering with an explicit file path. A missing file is skipped.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: Config = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!(
                "invalid log_level {:?}, expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        if self.data_dir.as_os_str().is_empty() {
            bail!("data_dir must not be empty");
        }
        self.security.validate()?;
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
