//! Error types for the sheetbridge core library.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field`. The first message per field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// `Ok(())` when no field failed, otherwise the collected errors.
    pub fn into_result(self) -> SheetResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SheetError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors that can occur during sheet, column and record operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SheetError {
    /// Network or transport failure talking to the spreadsheet backend
    #[error("Spreadsheet backend unavailable during {operation}: {message}")]
    RemoteUnavailable { operation: String, message: String },

    /// The spreadsheet or tab does not exist (HTTP 404)
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// A rename/remove targeted a header missing from the live header row
    #[error("Column not found in sheet header: {0}")]
    ColumnNotFound(String),

    /// An add would introduce a duplicate id, field or header name
    #[error("Column '{header_name}' collides with existing column '{existing_id}'")]
    DuplicateColumn {
        header_name: String,
        existing_id: String,
    },

    /// Built-in columns are not renamed or removed through the custom column flow
    #[error("Column '{0}' is a built-in column")]
    BuiltinColumn(String),

    /// One or more fields failed validation
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Required configuration (spreadsheet id, credential, identity) is absent
    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    /// No cached record with the given id
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// The caller's copy of a record points at a row that has since moved
    #[error("Record '{0}' is out of date, refresh before saving")]
    StaleRecord(String),

    /// Local key-value storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error serializing/deserializing JSON
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl SheetError {
    /// Shorthand for a transport failure during `operation`.
    pub fn remote(operation: &str, message: impl Into<String>) -> Self {
        SheetError::RemoteUnavailable {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// True for failures that come from talking to the remote sheet.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SheetError::RemoteUnavailable { .. } | SheetError::SheetNotFound(_)
        )
    }
}

impl From<serde_json::Error> for SheetError {
    fn from(err: serde_json::Error) -> Self {
        SheetError::JsonError(err.to_string())
    }
}

/// Result type alias for sheet operations.
pub type SheetResult<T> = Result<T, SheetError>;
