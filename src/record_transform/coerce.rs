//! Lenient cell coercion.
//!
//! Spreadsheet cells are untrusted; nothing here fails. Unparseable values fall
//! back to a safe default (built-in fields) or stay as text (custom fields).

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use super::CellValue;
use crate::column_model::ColumnType;
use crate::record_kind::{FieldKind, NumberDefault};

/// Date-only formats, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Date-time formats (form timestamps), tried after the date-only ones.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Format used when writing dates back to the sheet.
pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

const TRUE_VALUES: &[&str] = &["x", "true", "yes", "1"];
const FALSE_VALUES: &[&str] = &["false", "no", "0"];

/// Parse a date through the fallback chain; `None` if nothing matches.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .or_else(|| {
            DATE_TIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// `true` for `x`, `true`, `yes`, `1` (case-insensitive), otherwise `false`.
pub fn parse_boolean(raw: &str) -> bool {
    let value = raw.trim().to_lowercase();
    TRUE_VALUES.contains(&value.as_str())
}

/// Like [`parse_boolean`] but `None` for values that are neither truthy nor
/// an explicit `false` / `no` / `0`.
pub fn parse_boolean_strict(raw: &str) -> Option<bool> {
    let value = raw.trim().to_lowercase();
    if TRUE_VALUES.contains(&value.as_str()) {
        Some(true)
    } else if FALSE_VALUES.contains(&value.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a finite number, ignoring thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn current_year() -> f64 {
    Utc::now().year() as f64
}

/// Coerce a built-in cell. Never fails.
pub fn coerce(raw: &str, kind: FieldKind) -> CellValue {
    let value = raw.trim();
    match kind {
        FieldKind::Text => CellValue::Text(value.to_string()),
        FieldKind::Number(default) => CellValue::Number(parse_number(value).unwrap_or_else(|| {
            match default {
                NumberDefault::Zero => 0.0,
                NumberDefault::CurrentYear => current_year(),
            }
        })),
        FieldKind::Boolean => CellValue::Boolean(parse_boolean(value)),
        FieldKind::Date => parse_date_lenient(value)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Empty),
    }
}

/// Coerce a custom cell by its column's declared type, keeping the raw text
/// when it does not parse.
pub fn coerce_as(raw: &str, column_type: ColumnType) -> CellValue {
    let value = raw.trim();
    if value.is_empty() {
        return CellValue::Empty;
    }

    let text = || CellValue::Text(value.to_string());
    match column_type {
        ColumnType::String | ColumnType::Email | ColumnType::Phone => text(),
        ColumnType::Number => parse_number(value).map(CellValue::Number).unwrap_or_else(text),
        ColumnType::Boolean => parse_boolean_strict(value)
            .map(CellValue::Boolean)
            .unwrap_or_else(text),
        ColumnType::Date => parse_date_lenient(value)
            .map(CellValue::Date)
            .unwrap_or_else(text),
    }
}
