//! Per-identity persisted column settings.
//!
//! Settings are one JSON blob per identity key. Loading merges the saved
//! blob onto the current defaults instead of replacing them, so built-in
//! columns added in a later release show up for returning users while their
//! custom columns and presentation choices survive.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::column_model::{find_collision, ColumnDescriptor};
use crate::column_state::ColumnSettings;
use crate::error::{SheetError, SheetResult};
use crate::record_kind::RecordKind;

/// Simple string key-value persistence supplied by the host.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> SheetResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> SheetResult<()>;
    fn remove(&self, key: &str) -> SheetResult<()>;
}

/// [`KeyValueStore`] backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> SheetResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SheetResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SheetResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> SheetResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> SheetResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> SheetResult<()> {
        (**self).remove(key)
    }
}

/// Saved blob. Older clients stored only the column array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Persisted {
    Settings(ColumnSettings),
    Columns(Vec<ColumnDescriptor>),
}

/// Column settings persistence for one record kind.
pub struct ConfigStore<S: KeyValueStore> {
    store: S,
    kind: &'static RecordKind,
    key_prefix: String,
}

impl<S: KeyValueStore> ConfigStore<S> {
    pub fn new(store: S, kind: &'static RecordKind, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            kind,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Storage key for an identity: prefix plus the lowercased identity.
    pub fn key_for(&self, identity: &str) -> SheetResult<String> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(SheetError::ConfigurationMissing("identity key".to_string()));
        }
        Ok(format!("{}{}", self.key_prefix, identity.to_lowercase()))
    }

    /// Saved settings merged onto the defaults; defaults if nothing is saved
    /// or the blob does not parse.
    pub fn load(&self, identity: &str) -> SheetResult<ColumnSettings> {
        let key = self.key_for(identity)?;
        let defaults = ColumnSettings::defaults(self.kind);

        let raw = match self.store.get(&key)? {
            Some(raw) => raw,
            None => {
                debug!(key = %key, "No saved column settings, using defaults");
                return Ok(defaults);
            }
        };

        match serde_json::from_str::<Persisted>(&raw) {
            Ok(Persisted::Settings(saved)) => Ok(merge_settings(self.kind, defaults, saved)),
            Ok(Persisted::Columns(columns)) => {
                let saved = ColumnSettings {
                    columns,
                    ..defaults.clone()
                };
                Ok(merge_settings(self.kind, defaults, saved))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Saved column settings are corrupt, using defaults");
                Ok(defaults)
            }
        }
    }

    pub fn save(&self, identity: &str, settings: &ColumnSettings) -> SheetResult<()> {
        let key = self.key_for(identity)?;
        let json = serde_json::to_string(settings)?;
        self.store.set(&key, &json)
    }

    pub fn clear(&self, identity: &str) -> SheetResult<()> {
        let key = self.key_for(identity)?;
        self.store.remove(&key)
    }

    /// Move a settings blob saved under `legacy_key` into the identity's
    /// slot, unless that slot already holds something. The legacy entry is
    /// removed after copying. Returns whether anything moved.
    pub fn migrate(&self, legacy_key: &str, identity: &str) -> SheetResult<bool> {
        let key = self.key_for(identity)?;
        if self.store.get(&key)?.is_some() {
            return Ok(false);
        }
        let legacy = match self.store.get(legacy_key)? {
            Some(legacy) => legacy,
            None => return Ok(false),
        };

        self.store.set(&key, &legacy)?;
        self.store.remove(legacy_key)?;
        info!(from = legacy_key, to = %key, "Migrated legacy column settings");
        Ok(true)
    }
}

/// Overlay `saved` onto `defaults`.
///
/// Built-in columns keep their default definition but take visibility, width
/// and order from a saved column with the same id. Saved custom columns are
/// appended when their id is not a default id and they collide with nothing
/// already merged. Display preferences come from `saved`.
pub fn merge_settings(
    kind: &RecordKind,
    defaults: ColumnSettings,
    saved: ColumnSettings,
) -> ColumnSettings {
    let mut columns: Vec<ColumnDescriptor> = defaults
        .columns
        .into_iter()
        .map(|mut column| {
            if let Some(stored) = saved.columns.iter().find(|s| s.id == column.id) {
                column.visible = stored.visible;
                column.width = stored.width;
                column.order = stored.order;
            }
            column
        })
        .collect();

    for stored in saved.columns.into_iter().filter(|c| c.is_custom) {
        if kind.is_builtin_column_id(&stored.id) || kind.is_builtin_header(&stored.header_name) {
            continue;
        }
        if stored.field.is_empty() || find_collision(&stored, &columns).is_some() {
            debug!(column = %stored.id, "Dropping saved custom column that collides");
            continue;
        }
        columns.push(stored);
    }
    columns.sort_by_key(|c| c.order);

    ColumnSettings {
        columns,
        records_per_page: saved.records_per_page.max(1),
        theme: saved.theme,
        sync_interval_secs: saved.sync_interval_secs,
    }
}
