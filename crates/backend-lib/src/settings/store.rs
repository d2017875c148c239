// ============================
// crates/backend-lib/src/settings/store.rs
// ============================
//! Holder of the security policy in force.
//!
//! Readers take a cheap `Arc` snapshot. Writers are serialized, persist the
//! whole batch first and only then swap the snapshot, so no reader ever sees a
//! partially applied update.
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use warden_common::{SettingUpdate, SettingView};

use super::{SecuritySettings, SettingKey, SettingValue};
use crate::clock::Clock;
use crate::error::{AppError, FieldError, ValidationError};
use crate::metrics::SETTINGS_UPDATED;
use crate::storage::{SettingRecord, SettingsRepository};

#[derive(Debug, Clone)]
struct AuditStamp {
    updated_by: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Snapshot {
    settings: Arc<SecuritySettings>,
    audit: HashMap<SettingKey, AuditStamp>,
}

/// Settings manager: the single owner of the current [`SecuritySettings`]
pub struct SettingsStore {
    repository: Arc<dyn SettingsRepository>,
    defaults: SecuritySettings,
    snapshot: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl SettingsStore {
    /// Load persisted settings on top of `defaults`.
    ///
    /// Keys never written keep their default value. A persisted value outside
    /// its domain fails the load.
    pub async fn load(
        repository: Arc<dyn SettingsRepository>,
        defaults: SecuritySettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        defaults.validate()?;
        let snapshot = read_snapshot(repository.as_ref(), &defaults).await?;

        Ok(Self {
            repository,
            defaults,
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            clock,
        })
    }

    /// The policy in force right now
    pub fn current(&self) -> Arc<SecuritySettings> {
        self.snapshot.read().settings.clone()
    }

    pub fn get_all(&self) -> Vec<SettingView> {
        let snapshot = self.snapshot.read().clone();
        SettingKey::ALL
            .into_iter()
            .map(|key| view(&snapshot, key))
            .collect()
    }

    pub fn get_by_key(&self, key: &str) -> Result<SettingView, ValidationError> {
        let key: SettingKey = key.parse().map_err(|e: FieldError| ValidationError::from(vec![e]))?;
        let snapshot = self.snapshot.read().clone();
        Ok(view(&snapshot, key))
    }

    pub async fn update_one(
        &self,
        key: &str,
        value: &str,
        updated_by: &str,
    ) -> Result<SettingView, AppError> {
        let mut views = self
            .update_many(&[SettingUpdate::new(key, value)], updated_by)
            .await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("setting update produced no result".to_string()))
    }

    /// Apply a batch of raw updates all-or-nothing.
    ///
    /// Every entry is parsed and domain-checked before anything is written;
    /// one view is returned per distinct key.
    pub async fn update_many(
        &self,
        entries: &[SettingUpdate],
        updated_by: &str,
    ) -> Result<Vec<SettingView>, AppError> {
        let updated_by = updated_by.trim();
        let parsed = match parse_batch(entries) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    target: "warden::security",
                    updated_by,
                    rejected = %err,
                    "settings update rejected"
                );
                return Err(err.into());
            },
        };
        if updated_by.is_empty() {
            return Err(ValidationError::single("updated_by", "must not be empty").into());
        }
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let _writer = self.writer.lock().await;
        let current = self.snapshot.read().clone();

        let mut settings = (*current.settings).clone();
        for (key, value) in &parsed {
            settings.set(*key, *value).map_err(|e| ValidationError::from(vec![e]))?;
        }

        let now = self.clock.now();
        let records: Vec<SettingRecord> = parsed
            .iter()
            .map(|(key, value)| SettingRecord {
                key: key.as_str().to_string(),
                value: value.to_string(),
                updated_by: updated_by.to_string(),
                updated_at: now,
            })
            .collect();
        self.repository.save_batch(&records).await?;

        let mut audit = current.audit.clone();
        for (key, _) in &parsed {
            audit.insert(
                *key,
                AuditStamp {
                    updated_by: updated_by.to_string(),
                    updated_at: now,
                },
            );
        }
        let next = Arc::new(Snapshot {
            settings: Arc::new(settings),
            audit,
        });
        *self.snapshot.write() = next.clone();

        let changed: Vec<&str> = parsed.iter().map(|(key, _)| key.as_str()).collect();
        info!(
            target: "warden::security",
            updated_by,
            keys = ?changed,
            "security settings updated"
        );
        counter!(SETTINGS_UPDATED).increment(parsed.len() as u64);

        Ok(parsed.into_iter().map(|(key, _)| view(&next, key)).collect())
    }

    /// Drop the cached policy and read it again from persistence
    pub async fn reload(&self) -> Result<(), AppError> {
        let _writer = self.writer.lock().await;
        let snapshot = read_snapshot(self.repository.as_ref(), &self.defaults).await?;
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }
}

/// Parse raw wire entries into typed values, collecting every error.
/// Later entries for the same key win.
pub fn parse_batch(
    entries: &[SettingUpdate],
) -> Result<Vec<(SettingKey, SettingValue)>, ValidationError> {
    let mut parsed: Vec<(SettingKey, SettingValue)> = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();

    for entry in entries {
        let key: SettingKey = match entry.key.parse() {
            Ok(key) => key,
            Err(err) => {
                errors.push(err);
                continue;
            },
        };
        match key.parse_value(&entry.value) {
            Ok(value) => {
                parsed.retain(|(k, _)| *k != key);
                parsed.push((key, value));
            },
            Err(err) => errors.push(err),
        }
    }

    if errors.is_empty() {
        Ok(parsed)
    } else {
        Err(errors.into())
    }
}

async fn read_snapshot(
    repository: &dyn SettingsRepository,
    defaults: &SecuritySettings,
) -> Result<Snapshot, AppError> {
    let records = repository.load().await?;
    let mut settings = defaults.clone();
    let mut audit = HashMap::new();
    let mut errors = Vec::new();

    for record in records {
        let key: SettingKey = match record.key.parse() {
            Ok(key) => key,
            Err(_) => {
                warn!(key = %record.key, "ignoring unknown persisted setting");
                continue;
            },
        };
        match key.parse_value(&record.value).and_then(|v| settings.set(key, v)) {
            Ok(()) => {
                audit.insert(
                    key,
                    AuditStamp {
                        updated_by: record.updated_by,
                        updated_at: record.updated_at,
                    },
                );
            },
            Err(err) => errors.push(err),
        }
    }

    if !errors.is_empty() {
        return Err(ValidationError::from(errors).into());
    }

    Ok(Snapshot {
        settings: Arc::new(settings),
        audit,
    })
}

fn view(snapshot: &Snapshot, key: SettingKey) -> SettingView {
    let stamp = snapshot.audit.get(&key);
    SettingView {
        key: key.as_str().to_string(),
        value: snapshot.settings.get(key).to_string(),
        updated_by: stamp.map(|s| s.updated_by.clone()),
        updated_at: stamp.map(|s| s.updated_at),
    }
}
