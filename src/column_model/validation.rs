//! Per-field validation of custom column values.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ColumnDescriptor, ColumnType};
use crate::error::{FieldErrors, SheetError, SheetResult};
use crate::record_transform::{parse_boolean_strict, parse_date_lenient, parse_number};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9()\-. ]+$").expect("phone pattern is valid"));

/// Minimum digit count for a phone number.
const MIN_PHONE_DIGITS: usize = 7;

/// Check one raw value against a column's declared type and constraints.
pub fn validate_value(column: &ColumnDescriptor, raw: &str) -> Result<(), String> {
    let value = raw.trim();

    if value.is_empty() {
        return if column.required {
            Err(format!("{} is required", column.header_name))
        } else {
            Ok(())
        };
    }

    if let Some(max) = column.max_length {
        if value.chars().count() > max {
            return Err(format!(
                "{} must be at most {} characters",
                column.header_name, max
            ));
        }
    }

    match column.column_type {
        ColumnType::String => Ok(()),
        ColumnType::Number => parse_number(value)
            .map(|_| ())
            .ok_or_else(|| format!("{} must be a number", column.header_name)),
        ColumnType::Boolean => parse_boolean_strict(value)
            .map(|_| ())
            .ok_or_else(|| format!("{} must be yes or no", column.header_name)),
        ColumnType::Date => parse_date_lenient(value)
            .map(|_| ())
            .ok_or_else(|| format!("{} must be a valid date", column.header_name)),
        ColumnType::Email => {
            if EMAIL_PATTERN.is_match(value) {
                Ok(())
            } else {
                Err(format!("{} must be a valid email address", column.header_name))
            }
        }
        ColumnType::Phone => {
            let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
            if PHONE_PATTERN.is_match(value) && digits >= MIN_PHONE_DIGITS {
                Ok(())
            } else {
                Err(format!("{} must be a valid phone number", column.header_name))
            }
        }
    }
}

/// Validate every custom column's value in `values` (keyed by field).
///
/// Missing entries are treated as empty. All failures are collected; one bad
/// field never stops the others from being checked.
pub fn validate_custom_fields(
    columns: &[ColumnDescriptor],
    values: &BTreeMap<String, String>,
) -> SheetResult<()> {
    let mut errors = FieldErrors::new();

    for column in columns.iter().filter(|c| c.is_custom) {
        let raw = values.get(&column.field).map(String::as_str).unwrap_or("");
        if let Err(message) = validate_value(column, raw) {
            errors.add(column.field.clone(), message);
        }
    }

    errors.into_result()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationInput {
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub valid: bool,
    /// Field -> first failure message
    pub errors: BTreeMap<String, String>,
}

/// Validate custom field values using JSON strings.
///
/// Validation failures are part of the output, not an `Err`; only malformed
/// input is.
pub fn validate_custom_fields_json(input_json: &str) -> SheetResult<String> {
    let input: ValidationInput = serde_json::from_str(input_json)?;
    let errors = match validate_custom_fields(&input.columns, &input.values) {
        Ok(()) => BTreeMap::new(),
        Err(SheetError::Validation(errors)) => errors.0,
        Err(other) => return Err(other),
    };
    let output = ValidationOutput {
        valid: errors.is_empty(),
        errors,
    };
    Ok(serde_json::to_string(&output)?)
}
