//! Discovery and diff of custom columns.
//!
//! Compares the live header row against the locally known column set and
//! reports which custom columns appeared remotely, which vanished and which
//! known columns now sit under an edited header. Every comparison is made
//! against [`detect_custom_columns`], which looks at the header row alone.
//! Everything here is pure; the reconciler decides what to apply.

use serde::{Deserialize, Serialize};

use crate::column_model::{
    deduplicate_batch, new_custom_column_id, next_order, normalize_header, ColumnDescriptor,
    ColumnType,
};
use crate::error::SheetResult;
use crate::record_kind::{resolve_header_layout, RecordKind, RecordKindId};

/// A header that maps to a custom field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateColumn {
    /// Header text as it appears in the sheet (trimmed)
    pub header_name: String,
    /// Field after de-collision
    pub field: String,
    /// 0-based sheet column
    pub column_index: usize,
}

impl CandidateColumn {
    /// Same field or same normalized header. Candidates carry no id yet.
    pub fn collides_with(&self, column: &ColumnDescriptor) -> bool {
        self.field == column.field || normalize_header(&self.header_name) == column.normalized_header()
    }

    /// Build a local descriptor with a fresh id, ordered after `existing`.
    pub fn into_column(self, existing: &[ColumnDescriptor]) -> ColumnDescriptor {
        let id = new_custom_column_id(&self.field, existing);
        ColumnDescriptor::custom(id, self.header_name, ColumnType::String)
            .with_field(self.field)
            .with_order(next_order(existing))
    }
}

/// A known column found by its field under a different header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamedColumn {
    pub previous: ColumnDescriptor,
    pub current: CandidateColumn,
}

/// Full diff of one header row against the known columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDiff {
    pub added: Vec<CandidateColumn>,
    pub deleted: Vec<ColumnDescriptor>,
    /// Known columns still present by field whose header text changed
    pub renamed: Vec<RenamedColumn>,
}

impl ColumnDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Every header that is not a built-in alias, with a generated field.
///
/// Two headers that generate the same field within one row get `_1`, `_2`,
/// ... suffixes in sheet order. Blank headers are skipped.
pub fn detect_custom_columns(kind: &RecordKind, headers: &[String]) -> Vec<CandidateColumn> {
    resolve_header_layout(kind, headers, &[])
        .custom_slots()
        .map(|(column_index, field, header_name)| CandidateColumn {
            header_name: header_name.to_string(),
            field: field.to_string(),
            column_index,
        })
        .collect()
}

/// Custom headers that collide with nothing in `known`.
///
/// A candidate collides with a column sharing its field or its normalized
/// header; candidates also collide with earlier candidates of the same pass.
pub fn detect_new_custom_columns(
    kind: &RecordKind,
    headers: &[String],
    known: &[ColumnDescriptor],
) -> Vec<CandidateColumn> {
    let mut found: Vec<CandidateColumn> = Vec::new();
    for candidate in detect_custom_columns(kind, headers) {
        let seen = known.iter().any(|c| candidate.collides_with(c))
            || found.iter().any(|f| {
                f.field == candidate.field
                    || normalize_header(&f.header_name) == normalize_header(&candidate.header_name)
            });
        if !seen {
            found.push(candidate);
        }
    }
    found
}

/// Known custom columns whose normalized header and field both are missing
/// from [`detect_custom_columns`] of the row.
///
/// Built-in columns are never reported.
pub fn detect_deleted_custom_columns(
    kind: &RecordKind,
    headers: &[String],
    known: &[ColumnDescriptor],
) -> Vec<ColumnDescriptor> {
    let present = detect_custom_columns(kind, headers);
    known
        .iter()
        .filter(|c| c.is_custom)
        .filter(|c| !present.iter().any(|p| p.collides_with(c)))
        .cloned()
        .collect()
}

/// Run all three detections over one header row.
pub fn diff_columns(kind: &RecordKind, headers: &[String], known: &[ColumnDescriptor]) -> ColumnDiff {
    let present = detect_custom_columns(kind, headers);
    let added = detect_new_custom_columns(kind, headers, known);
    let deleted = detect_deleted_custom_columns(kind, headers, known);

    let renamed = known
        .iter()
        .filter(|c| c.is_custom)
        .filter(|c| {
            let normalized = c.normalized_header();
            !present.iter().any(|p| normalize_header(&p.header_name) == normalized)
        })
        .filter_map(|previous| {
            present
                .iter()
                .find(|p| p.field == previous.field)
                .map(|current| RenamedColumn {
                    previous: previous.clone(),
                    current: current.clone(),
                })
        })
        .collect();

    ColumnDiff {
        added,
        deleted,
        renamed,
    }
}

/// Turn candidates into descriptors for one batch addition: fresh ids,
/// consecutive orders after `existing`, intra-batch duplicates dropped.
pub fn candidates_to_columns(
    candidates: Vec<CandidateColumn>,
    existing: &[ColumnDescriptor],
) -> Vec<ColumnDescriptor> {
    let mut pool: Vec<ColumnDescriptor> = existing.to_vec();
    let mut batch = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let column = candidate.into_column(&pool);
        pool.push(column.clone());
        batch.push(column);
    }
    deduplicate_batch(batch)
}

/// Input of the JSON entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInput {
    pub kind: RecordKindId,
    pub headers: Vec<String>,
    #[serde(default)]
    pub known_columns: Vec<ColumnDescriptor>,
}

/// Diff a header row using JSON strings.
/// Convenience function for the browser bindings.
pub fn diff_columns_json(input_json: &str) -> SheetResult<String> {
    let input: DiscoveryInput = serde_json::from_str(input_json)?;
    let diff = diff_columns(input.kind.kind(), &input.headers, &input.known_columns);
    Ok(serde_json::to_string(&diff)?)
}
