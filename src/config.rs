//! Client configuration.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::error::{SheetError, SheetResult};
use crate::reconcile::DEFAULT_COOLDOWN;
use crate::record_kind::RecordKind;

pub const ENV_SPREADSHEET_ID: &str = "SHEETBRIDGE_SPREADSHEET_ID";
pub const ENV_SHEET_NAME: &str = "SHEETBRIDGE_SHEET_NAME";
pub const ENV_COOLDOWN_MS: &str = "SHEETBRIDGE_COOLDOWN_MS";
pub const ENV_AUTO_SYNC_DELAY_MS: &str = "SHEETBRIDGE_AUTO_SYNC_DELAY_MS";

/// Delay between sign-in and the first automatic reconciliation.
pub const DEFAULT_AUTO_SYNC_DELAY: Duration = Duration::from_millis(1000);

/// Settings for one [`crate::client::SheetClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub spreadsheet_id: String,
    /// Tab holding the records; defaults to the kind's sheet name
    pub sheet_name: String,
    pub cooldown: Duration,
    pub auto_sync_delay: Duration,
    /// Prefix of per-identity settings keys
    pub storage_key_prefix: String,
    /// Key used by clients that stored one settings blob for everyone
    pub legacy_storage_key: String,
}

impl ClientConfig {
    pub fn new(spreadsheet_id: impl Into<String>, kind: &RecordKind) -> Self {
        let kind_name = kind.id.as_str();
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: kind.sheet_name.to_string(),
            cooldown: DEFAULT_COOLDOWN,
            auto_sync_delay: DEFAULT_AUTO_SYNC_DELAY,
            storage_key_prefix: format!("sheetbridge.{}.columns.", kind_name),
            legacy_storage_key: format!("sheetbridge.{}.columns", kind_name),
        }
    }

    pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = sheet_name.into();
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_auto_sync_delay(mut self, delay: Duration) -> Self {
        self.auto_sync_delay = delay;
        self
    }

    pub fn with_storage_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_key_prefix = prefix.into();
        self
    }

    pub fn with_legacy_storage_key(mut self, key: impl Into<String>) -> Self {
        self.legacy_storage_key = key.into();
        self
    }

    /// Read configuration from `SHEETBRIDGE_*` environment variables.
    ///
    /// The spreadsheet id is required. Unparseable durations fall back to
    /// their defaults with a warning.
    pub fn from_env(kind: &RecordKind) -> SheetResult<Self> {
        Self::from_lookup(kind, |name| env::var(name).ok())
    }

    fn from_lookup(kind: &RecordKind, lookup: impl Fn(&str) -> Option<String>) -> SheetResult<Self> {
        let spreadsheet_id = lookup(ENV_SPREADSHEET_ID)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SheetError::ConfigurationMissing(ENV_SPREADSHEET_ID.to_string()))?;

        let mut config = Self::new(spreadsheet_id.trim(), kind);
        if let Some(sheet_name) = lookup(ENV_SHEET_NAME).filter(|v| !v.trim().is_empty()) {
            config.sheet_name = sheet_name.trim().to_string();
        }
        if let Some(cooldown) = millis(&lookup, ENV_COOLDOWN_MS) {
            config.cooldown = cooldown;
        }
        if let Some(delay) = millis(&lookup, ENV_AUTO_SYNC_DELAY_MS) {
            config.auto_sync_delay = delay;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SheetResult<()> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(SheetError::ConfigurationMissing("spreadsheet id".to_string()));
        }
        if self.sheet_name.trim().is_empty() {
            return Err(SheetError::ConfigurationMissing("sheet name".to_string()));
        }
        if self.storage_key_prefix.trim().is_empty() {
            return Err(SheetError::ConfigurationMissing("storage key prefix".to_string()));
        }
        Ok(())
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring invalid duration");
            None
        }
    }
}
