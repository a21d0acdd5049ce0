//! Record transform: the spreadsheet grid <-> typed records.
//!
//! Both directions are driven by the live header row (see
//! [`resolve_header_layout`]), never by a fixed column layout, because
//! collaborators can add, move or delete columns at any time.

mod coerce;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::column_model::ColumnDescriptor;
use crate::error::SheetResult;
use crate::record_kind::{resolve_header_layout, HeaderSlot, RecordKind, RecordKindId};

pub use coerce::{
    coerce, coerce_as, parse_boolean, parse_boolean_strict, parse_date_lenient, parse_number,
    DATE_OUTPUT_FORMAT,
};

/// Row number of the header row; the first data row is `HEADER_ROW + 1`.
pub const HEADER_ROW: u32 = 1;

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl CellValue {
    /// Text written to the sheet for this value.
    pub fn to_cell_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Boolean(true) => "TRUE".to_string(),
            CellValue::Boolean(false) => "FALSE".to_string(),
            CellValue::Date(date) => date.format(DATE_OUTPUT_FORMAT).to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }
}

/// One spreadsheet row as a typed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    /// 1-based sheet row; header is row 1, so the first data row is 2
    pub row_index: u32,
    /// Built-in fields keyed by the kind's field key
    pub fields: BTreeMap<String, CellValue>,
    /// Everything else, keyed by custom column field
    pub custom_fields: BTreeMap<String, CellValue>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(id: impl Into<String>, row_index: u32) -> Self {
        Self {
            id: id.into(),
            row_index,
            fields: BTreeMap::new(),
            custom_fields: BTreeMap::new(),
            last_modified: None,
        }
    }

    /// Built-in value by key, falling back to the custom fields.
    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.get(key).or_else(|| self.custom_fields.get(key))
    }

    /// Cell text for `key`, empty when absent.
    pub fn text(&self, key: &str) -> String {
        self.get(key).map(CellValue::to_cell_string).unwrap_or_default()
    }

    /// Mark the record as locally modified.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = Some(now);
    }

    /// "First Last" from the built-in name fields, when present.
    pub fn display_name(&self) -> String {
        let first = self.text("first_name");
        let last = self.text("last_name");
        format!("{} {}", first, last).trim().to_string()
    }
}

/// Field values for a record that does not exist in the sheet yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    /// Built-in field key -> raw text
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Custom field -> raw text
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

/// Id assigned to a record read from `row_index`. Only unique within one
/// read of the grid; callers that keep records across edits assign their own.
pub fn row_record_id(kind: &RecordKind, row_index: u32) -> String {
    format!("{}_row_{}", kind.record_id_prefix, row_index)
}

/// Map a header row plus data rows to records.
///
/// Built-in headers are coerced by the kind's field table; every other
/// non-blank header becomes a custom field, typed by the matching entry of
/// `columns` when there is one. Rows with no non-blank cell are skipped but
/// still count towards row numbering.
pub fn grid_to_records(
    kind: &RecordKind,
    header_row: &[String],
    data_rows: &[Vec<String>],
    columns: &[ColumnDescriptor],
) -> Vec<Record> {
    let layout = resolve_header_layout(kind, header_row, columns);
    let mut records = Vec::with_capacity(data_rows.len());

    for (position, row) in data_rows.iter().enumerate() {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let row_index = position as u32 + HEADER_ROW + 1;
        let mut record = Record::new(row_record_id(kind, row_index), row_index);

        for (index, slot) in layout.slots.iter().enumerate() {
            let cell = row.get(index).map(String::as_str).unwrap_or("");
            match slot {
                HeaderSlot::Builtin(field) => {
                    let value = coerce(cell, field.kind);
                    // Duplicate alias columns: the first non-empty cell wins
                    let keep_existing = record
                        .fields
                        .get(field.key)
                        .map(|existing| !existing.is_empty())
                        .unwrap_or(false);
                    if !keep_existing {
                        record.fields.insert(field.key.to_string(), value);
                    }
                }
                HeaderSlot::Custom { field, .. } => {
                    let value = match columns.iter().find(|c| c.is_custom && c.field == *field) {
                        Some(column) => coerce_as(cell, column.column_type),
                        None => coerce_as(cell, Default::default()),
                    };
                    record.custom_fields.insert(field.clone(), value);
                }
                HeaderSlot::Ignored => {}
            }
        }

        records.push(record);
    }

    records
}

/// Encode a record as one row laid out exactly like `header_row`.
///
/// Columns the record has no value for (and blank headers) are written empty.
pub fn record_to_row(
    kind: &RecordKind,
    record: &Record,
    header_row: &[String],
    columns: &[ColumnDescriptor],
) -> Vec<String> {
    let layout = resolve_header_layout(kind, header_row, columns);

    layout
        .slots
        .iter()
        .map(|slot| match slot {
            HeaderSlot::Builtin(field) => record
                .fields
                .get(field.key)
                .map(CellValue::to_cell_string)
                .unwrap_or_default(),
            HeaderSlot::Custom { field, .. } => record
                .custom_fields
                .get(field)
                .map(CellValue::to_cell_string)
                .unwrap_or_default(),
            HeaderSlot::Ignored => String::new(),
        })
        .collect()
}

/// Build a typed record from a draft. Unknown built-in keys are dropped.
pub fn build_record(
    kind: &RecordKind,
    columns: &[ColumnDescriptor],
    draft: &RecordDraft,
    id: impl Into<String>,
    row_index: u32,
) -> Record {
    let mut record = Record::new(id, row_index);

    for field in kind.fields {
        let raw = draft.fields.get(field.key).map(String::as_str).unwrap_or("");
        record.fields.insert(field.key.to_string(), coerce(raw, field.kind));
    }

    for column in columns.iter().filter(|c| c.is_custom) {
        if let Some(raw) = draft.custom_fields.get(&column.field) {
            record
                .custom_fields
                .insert(column.field.clone(), coerce_as(raw, column.column_type));
        }
    }

    record
}

/// Raw text of every custom field, for validation.
pub fn custom_field_texts(record: &Record) -> BTreeMap<String, String> {
    record
        .custom_fields
        .iter()
        .map(|(field, value)| (field.clone(), value.to_cell_string()))
        .collect()
}

/// 1-based row number from an append response range such as `Students!A7:F7`.
pub fn row_from_updated_range(updated_range: &str) -> Option<u32> {
    let cells = updated_range.rsplit('!').next().unwrap_or(updated_range);
    let first = cells.split(':').next()?;
    let digits: String = first
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic() || *c == '$')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Input of [`grid_to_records_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridInput {
    pub kind: RecordKindId,
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

/// Input of [`record_to_row_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowInput {
    pub kind: RecordKindId,
    pub record: Record,
    pub headers: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

/// Grid to records using JSON strings.
pub fn grid_to_records_json(input_json: &str) -> SheetResult<String> {
    let input: GridInput = serde_json::from_str(input_json)?;
    let records = grid_to_records(input.kind.kind(), &input.headers, &input.rows, &input.columns);
    Ok(serde_json::to_string(&records)?)
}

/// Record to row using JSON strings.
pub fn record_to_row_json(input_json: &str) -> SheetResult<String> {
    let input: RowInput = serde_json::from_str(input_json)?;
    let row = record_to_row(input.kind.kind(), &input.record, &input.headers, &input.columns);
    Ok(serde_json::to_string(&row)?)
}
