//! Column identity model.
//!
//! A column is identified along three independent axes: its local `id`, its
//! storage `field` and its (normalized) `header_name`. Column descriptors can
//! originate from three places (user-authored add, remote discovery, the
//! default built-in schema) and each origin tends to agree with the others on
//! only one of the three axes, so every insertion path checks all three via
//! [`columns_collide`].

mod validation;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SheetError, SheetResult};

pub use validation::{
    validate_custom_fields, validate_custom_fields_json, validate_value, ValidationInput,
    ValidationOutput,
};

/// Default column width in pixels.
pub const DEFAULT_COLUMN_WIDTH: u32 = 150;

/// Prefix shared by every custom column id.
pub const CUSTOM_ID_PREFIX: &str = "custom_";

/// Declared value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Email,
    Phone,
}

fn default_true() -> bool {
    true
}

fn default_width() -> u32 {
    DEFAULT_COLUMN_WIDTH
}

/// Metadata describing one field of the dataset and its display/storage mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Stable local identifier
    pub id: String,
    /// Storage key (custom fields map key, or built-in field key)
    pub field: String,
    /// Display name; for custom columns also the literal sheet header text
    pub header_name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub editable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default)]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub is_custom: bool,
}

impl ColumnDescriptor {
    /// A custom column whose field is derived from its header name.
    pub fn custom(id: impl Into<String>, header_name: impl Into<String>, column_type: ColumnType) -> Self {
        let header_name = header_name.into();
        Self {
            id: id.into(),
            field: generate_field_name(&header_name),
            header_name,
            column_type,
            visible: true,
            editable: true,
            required: false,
            width: DEFAULT_COLUMN_WIDTH,
            order: 0,
            description: None,
            max_length: None,
            is_custom: true,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Normalized header text used for identity comparisons.
    pub fn normalized_header(&self) -> String {
        normalize_header(&self.header_name)
    }
}

/// User input for creating a custom column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColumnDraft {
    pub header_name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    /// Sheet column index the new header should follow, if not appended
    #[serde(default)]
    pub insert_after_index: Option<usize>,
}

impl CustomColumnDraft {
    pub fn new(header_name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            header_name: header_name.into(),
            column_type,
            required: false,
            max_length: None,
            description: None,
            width: None,
            insert_after_index: None,
        }
    }

    /// Build a descriptor for this draft, rejecting blank names and any
    /// collision with `existing`.
    pub fn into_descriptor(self, existing: &[ColumnDescriptor]) -> SheetResult<ColumnDescriptor> {
        let header_name = self.header_name.trim().to_string();
        let field = generate_field_name(&header_name);
        if field.is_empty() {
            let mut errors = crate::error::FieldErrors::new();
            errors.add(
                "headerName",
                "Column name must contain at least one letter or digit",
            );
            return Err(SheetError::Validation(errors));
        }

        let mut column = ColumnDescriptor::custom(
            new_custom_column_id(&field, existing),
            header_name,
            self.column_type,
        );
        column.required = self.required;
        column.max_length = self.max_length;
        column.description = self.description;
        column.width = self.width.unwrap_or(DEFAULT_COLUMN_WIDTH);
        column.order = next_order(existing);

        if let Some(existing) = find_collision(&column, existing) {
            return Err(SheetError::DuplicateColumn {
                header_name: column.header_name,
                existing_id: existing.id.clone(),
            });
        }
        Ok(column)
    }
}

/// Lowercase and strip everything except `[a-z0-9]`.
///
/// "First Name" -> "firstname", "Parent's Cell #" -> "parentscell"
pub fn normalize_header(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Derive a storage field from a display name: lowercase, collapse runs of
/// non-alphanumerics into one underscore, trim leading/trailing underscores.
///
/// "Emergency Contact!" -> "emergency_contact"
pub fn generate_field_name(text: &str) -> String {
    let mut field = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !field.is_empty() {
                field.push('_');
            }
            pending_separator = false;
            field.push(c);
        } else {
            pending_separator = true;
        }
    }

    field
}

/// Canonical collision test: same id, same field, or same normalized header.
pub fn columns_collide(a: &ColumnDescriptor, b: &ColumnDescriptor) -> bool {
    a.id == b.id || a.field == b.field || a.normalized_header() == b.normalized_header()
}

/// First column in `columns` that collides with `candidate`.
pub fn find_collision<'a>(
    candidate: &ColumnDescriptor,
    columns: &'a [ColumnDescriptor],
) -> Option<&'a ColumnDescriptor> {
    columns.iter().find(|c| columns_collide(candidate, c))
}

/// Drop every column that collides with an earlier column in the batch.
pub fn deduplicate_batch(columns: Vec<ColumnDescriptor>) -> Vec<ColumnDescriptor> {
    let mut kept: Vec<ColumnDescriptor> = Vec::with_capacity(columns.len());
    for column in columns {
        if find_collision(&column, &kept).is_none() {
            kept.push(column);
        }
    }
    kept
}

/// True when no two columns share an id, a field or a normalized header.
pub fn is_collision_free(columns: &[ColumnDescriptor]) -> bool {
    columns
        .iter()
        .enumerate()
        .all(|(i, a)| columns[i + 1..].iter().all(|b| !columns_collide(a, b)))
}

/// Id for a user-authored column: `custom_<field>_<random suffix>`.
pub fn new_custom_column_id(field: &str, existing: &[ColumnDescriptor]) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        let id = format!("{}{}_{}", CUSTOM_ID_PREFIX, field, suffix);
        if !existing.iter().any(|c| c.id == id) {
            return id;
        }
    }
}

/// Order value that places a new column after every existing one.
pub fn next_order(columns: &[ColumnDescriptor]) -> u32 {
    columns.iter().map(|c| c.order + 1).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(id: &str, header: &str) -> ColumnDescriptor {
        ColumnDescriptor::custom(id, header, ColumnType::String)
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("First Name"), "firstname");
        assert_eq!(normalize_header("Parent's Cell #"), "parentscell");
        assert_eq!(normalize_header("  E-Mail  "), "email");
        assert_eq!(normalize_header("???"), "");
    }

    #[test]
    fn test_generate_field_name() {
        assert_eq!(generate_field_name("Emergency Contact!"), "emergency_contact");
        assert_eq!(generate_field_name("  Notes  "), "notes");
        assert_eq!(generate_field_name("T-Shirt  Size (adult)"), "t_shirt_size_adult");
        assert_eq!(generate_field_name("__a__b__"), "a_b");
        assert_eq!(generate_field_name("!!!"), "");
        // Apostrophes separate words; only normalize_header drops them.
        assert_eq!(generate_field_name("Parent's Cell #"), "parent_s_cell");
        assert_eq!(normalize_header("Parent's Cell #"), "parentscell");
    }

    #[test]
    fn test_collision_on_each_axis() {
        let base = column("custom_1", "Notes");

        assert!(columns_collide(&base, &column("custom_1", "Other")));
        assert!(columns_collide(
            &base,
            &column("custom_2", "Something").with_field("notes")
        ));
        assert!(columns_collide(&base, &column("custom_3", " NOTES ")));
        assert!(!columns_collide(&base, &column("custom_4", "Allergies")));
    }

    #[test]
    fn test_deduplicate_batch_keeps_first() {
        let batch = vec![
            column("custom_notes", "Notes "),
            column("custom_notes_2", "notes"),
            column("custom_allergies", "Allergies"),
        ];

        let deduped = deduplicate_batch(batch);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "custom_notes");
        assert_eq!(deduped[1].id, "custom_allergies");
        assert!(is_collision_free(&deduped));
    }

    #[test]
    fn test_new_custom_column_id_shape() {
        let id = new_custom_column_id("notes", &[]);
        assert!(id.starts_with("custom_notes_"));
        assert_eq!(id.len(), "custom_notes_".len() + 6);
    }

    #[test]
    fn test_draft_rejects_duplicates_and_blank_names() {
        let existing = vec![column("custom_1", "Notes")];

        let err = CustomColumnDraft::new("notes!", ColumnType::String)
            .into_descriptor(&existing)
            .unwrap_err();
        assert!(matches!(err, SheetError::DuplicateColumn { ref existing_id, .. } if existing_id == "custom_1"));

        let err = CustomColumnDraft::new("  ?? ", ColumnType::String)
            .into_descriptor(&existing)
            .unwrap_err();
        assert!(matches!(err, SheetError::Validation(_)));
    }

    #[test]
    fn test_draft_builds_custom_descriptor() {
        let existing = vec![column("custom_1", "Notes").with_order(4)];
        let mut draft = CustomColumnDraft::new(" Emergency Contact ", ColumnType::Phone);
        draft.max_length = Some(20);

        let built = draft.into_descriptor(&existing).unwrap();

        assert_eq!(built.header_name, "Emergency Contact");
        assert_eq!(built.field, "emergency_contact");
        assert_eq!(built.column_type, ColumnType::Phone);
        assert_eq!(built.order, 5);
        assert_eq!(built.max_length, Some(20));
        assert!(built.is_custom);
    }

    #[test]
    fn test_descriptor_json_shape() {
        let json = serde_json::to_value(column("custom_1", "Notes")).unwrap();
        assert_eq!(json["headerName"], "Notes");
        assert_eq!(json["type"], "string");
        assert_eq!(json["isCustom"], true);
        assert!(json.get("maxLength").is_none());

        let parsed: ColumnDescriptor = serde_json::from_str(
            r#"{"id":"custom_1","field":"notes","headerName":"Notes","isCustom":true}"#,
        )
        .unwrap();
        assert!(parsed.visible);
        assert_eq!(parsed.width, DEFAULT_COLUMN_WIDTH);
        assert_eq!(parsed.column_type, ColumnType::String);
    }
}
