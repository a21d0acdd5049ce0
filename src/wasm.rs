//! WASM bindings for the browser client.

use wasm_bindgen::prelude::*;

use crate::column_model::{generate_field_name, normalize_header, validate_custom_fields_json};
use crate::column_model::{ValidationInput, ValidationOutput};
use crate::column_state::{transition, ColumnSettings, TransitionInput};
use crate::discovery::{
    detect_custom_columns, detect_deleted_custom_columns, detect_new_custom_columns,
    diff_columns, DiscoveryInput,
};
use crate::error::SheetError;
use crate::record_kind::RecordKindId;
use crate::record_transform::{grid_to_records, record_to_row, GridInput, RowInput};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    pub fn log(s: &str);
}

/// Initialize panic hook for better error messages.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn parse_input<T: serde::de::DeserializeOwned>(input: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(input)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse input: {}", e)))
}

fn to_output<T: serde::Serialize>(output: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(output)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize output: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Column Model WASM Bindings
// ═══════════════════════════════════════════════════════════════════════════════

/// Lowercase a header and strip everything except `[a-z0-9]`.
#[wasm_bindgen(js_name = normalizeHeader)]
pub fn normalize_header_js(text: &str) -> String {
    normalize_header(text)
}

/// Derive the storage field for a header, e.g. "Emergency Contact!" -> "emergency_contact".
#[wasm_bindgen(js_name = generateFieldName)]
pub fn generate_field_name_js(text: &str) -> String {
    generate_field_name(text)
}

/// Built-in columns of a record kind ("students" or "sign_ins").
#[wasm_bindgen(js_name = defaultColumns)]
pub fn default_columns_js(kind: JsValue) -> Result<JsValue, JsValue> {
    let kind: RecordKindId = parse_input(kind)?;
    to_output(&kind.kind().default_columns())
}

/// Validate custom field values.
///
/// Takes a JsValue (ValidationInput) and returns a JsValue (ValidationOutput).
#[wasm_bindgen(js_name = validateCustomFields)]
pub fn validate_custom_fields_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: ValidationInput = parse_input(input)?;
    let errors = match crate::column_model::validate_custom_fields(&input.columns, &input.values) {
        Ok(()) => Default::default(),
        Err(SheetError::Validation(errors)) => errors.0,
        Err(e) => return Err(JsValue::from_str(&format!("Validation failed: {}", e))),
    };
    to_output(&ValidationOutput {
        valid: errors.is_empty(),
        errors,
    })
}

/// Validate custom field values using JSON strings (alternative API).
#[wasm_bindgen(js_name = validateCustomFieldsJson)]
pub fn validate_custom_fields_json_js(input_json: &str) -> Result<String, JsValue> {
    validate_custom_fields_json(input_json)
        .map_err(|e| JsValue::from_str(&format!("Validation failed: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Discovery WASM Bindings
// ═══════════════════════════════════════════════════════════════════════════════

/// Every non-built-in header of a row, with generated fields.
///
/// Takes a JsValue (DiscoveryInput; knownColumns is ignored).
#[wasm_bindgen(js_name = detectCustomColumns)]
pub fn detect_custom_columns_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: DiscoveryInput = parse_input(input)?;
    to_output(&detect_custom_columns(input.kind.kind(), &input.headers))
}

/// Custom headers not yet in knownColumns.
#[wasm_bindgen(js_name = detectNewCustomColumns)]
pub fn detect_new_custom_columns_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: DiscoveryInput = parse_input(input)?;
    to_output(&detect_new_custom_columns(
        input.kind.kind(),
        &input.headers,
        &input.known_columns,
    ))
}

/// Known custom columns that vanished from the header row.
#[wasm_bindgen(js_name = detectDeletedCustomColumns)]
pub fn detect_deleted_custom_columns_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: DiscoveryInput = parse_input(input)?;
    to_output(&detect_deleted_custom_columns(
        input.kind.kind(),
        &input.headers,
        &input.known_columns,
    ))
}

/// Added, deleted and probably-renamed columns in one pass.
///
/// Takes a JsValue (DiscoveryInput) and returns a JsValue (ColumnDiff).
#[wasm_bindgen(js_name = diffColumns)]
pub fn diff_columns_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: DiscoveryInput = parse_input(input)?;
    to_output(&diff_columns(input.kind.kind(), &input.headers, &input.known_columns))
}

/// Diff columns using JSON strings (alternative API).
#[wasm_bindgen(js_name = diffColumnsJson)]
pub fn diff_columns_json_js(input_json: &str) -> Result<String, JsValue> {
    crate::discovery::diff_columns_json(input_json)
        .map_err(|e| JsValue::from_str(&format!("Diff failed: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Column State WASM Bindings
// ═══════════════════════════════════════════════════════════════════════════════

/// Apply one column action.
///
/// Takes a JsValue (TransitionInput) and returns a JsValue (ColumnSettings).
#[wasm_bindgen(js_name = transitionColumns)]
pub fn transition_columns_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: TransitionInput = parse_input(input)?;
    let kind = input.kind.kind();
    let state = input.state.unwrap_or_else(|| ColumnSettings::defaults(kind));
    to_output(&transition(kind, state, input.action))
}

/// Apply one column action using JSON strings (alternative API).
#[wasm_bindgen(js_name = transitionColumnsJson)]
pub fn transition_columns_json_js(input_json: &str) -> Result<String, JsValue> {
    crate::column_state::transition_json(input_json)
        .map_err(|e| JsValue::from_str(&format!("Transition failed: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Record Transform WASM Bindings
// ═══════════════════════════════════════════════════════════════════════════════

/// Convert grid rows to typed records using the live header row.
///
/// Takes a JsValue (GridInput) and returns a JsValue (Record[]).
#[wasm_bindgen(js_name = gridToRecords)]
pub fn grid_to_records_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: GridInput = parse_input(input)?;
    to_output(&grid_to_records(
        input.kind.kind(),
        &input.headers,
        &input.rows,
        &input.columns,
    ))
}

/// Grid to records using JSON strings (alternative API).
#[wasm_bindgen(js_name = gridToRecordsJson)]
pub fn grid_to_records_json_js(input_json: &str) -> Result<String, JsValue> {
    crate::record_transform::grid_to_records_json(input_json)
        .map_err(|e| JsValue::from_str(&format!("Transform failed: {}", e)))
}

/// Lay a record out as one row matching the live header row.
///
/// Takes a JsValue (RowInput) and returns a JsValue (string[]).
#[wasm_bindgen(js_name = recordToRow)]
pub fn record_to_row_js(input: JsValue) -> Result<JsValue, JsValue> {
    let input: RowInput = parse_input(input)?;
    to_output(&record_to_row(
        input.kind.kind(),
        &input.record,
        &input.headers,
        &input.columns,
    ))
}

/// Record to row using JSON strings (alternative API).
#[wasm_bindgen(js_name = recordToRowJson)]
pub fn record_to_row_json_js(input_json: &str) -> Result<String, JsValue> {
    crate::record_transform::record_to_row_json(input_json)
        .map_err(|e| JsValue::from_str(&format!("Transform failed: {}", e)))
}
