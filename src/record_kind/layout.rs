//! Mapping of a live header row onto built-in and custom fields.
//!
//! Reading rows, writing rows and discovering custom columns all go through
//! [`resolve_header_layout`] so they agree on which field each header maps to.

use std::collections::HashSet;

use super::{BuiltinField, RecordKind};
use crate::column_model::{generate_field_name, normalize_header, ColumnDescriptor};

/// What a single header cell maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderSlot {
    Builtin(&'static BuiltinField),
    Custom { field: String, header_name: String },
    /// Blank or punctuation-only header
    Ignored,
}

/// One slot per header cell, in sheet order.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderLayout {
    pub slots: Vec<HeaderSlot>,
}

impl HeaderLayout {
    /// Custom slots with their sheet column index.
    pub fn custom_slots(&self) -> impl Iterator<Item = (usize, &str, &str)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            HeaderSlot::Custom { field, header_name } => {
                Some((index, field.as_str(), header_name.as_str()))
            }
            _ => None,
        })
    }

    /// Sheet column index of the first slot bound to `field`.
    pub fn index_of_custom_field(&self, field: &str) -> Option<usize> {
        self.custom_slots()
            .find(|(_, f, _)| *f == field)
            .map(|(index, _, _)| index)
    }
}

/// Resolve every header against the kind's built-in aliases and the known
/// custom columns.
///
/// A custom header first reuses the field of a known custom column with the
/// same normalized header. The remaining headers get their generated field
/// name, suffixed `_1`, `_2`, ... while that field is already taken in this
/// row or belongs to a built-in column. A generated field that names a known
/// custom column whose header is missing from the row binds to that column,
/// so a header edited in the sheet keeps its data under the same field.
pub fn resolve_header_layout(
    kind: &RecordKind,
    headers: &[String],
    known_columns: &[ColumnDescriptor],
) -> HeaderLayout {
    let reserved: HashSet<&str> = known_columns
        .iter()
        .filter(|c| !c.is_custom)
        .map(|c| c.field.as_str())
        .collect();
    let mut used: HashSet<String> = HashSet::new();

    let mut slots: Vec<HeaderSlot> = headers
        .iter()
        .map(|header| match kind.builtin_for_header(header) {
            Some(builtin) => HeaderSlot::Builtin(builtin),
            None if generate_field_name(header).is_empty() => HeaderSlot::Ignored,
            None => HeaderSlot::Custom {
                field: String::new(),
                header_name: header.trim().to_string(),
            },
        })
        .collect();

    // Known headers claim their fields before anything is generated.
    for slot in slots.iter_mut() {
        if let HeaderSlot::Custom { field, header_name } = slot {
            let normalized = normalize_header(header_name);
            let known = known_columns
                .iter()
                .find(|c| c.is_custom && c.normalized_header() == normalized && !used.contains(&c.field));
            if let Some(column) = known {
                *field = column.field.clone();
                used.insert(column.field.clone());
            }
        }
    }

    for slot in slots.iter_mut() {
        if let HeaderSlot::Custom { field, header_name } = slot {
            if !field.is_empty() {
                continue;
            }
            let base = generate_field_name(header_name);
            let mut candidate = base.clone();
            let mut suffix = 1;
            while used.contains(&candidate) || reserved.contains(candidate.as_str()) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            used.insert(candidate.clone());
            *field = candidate;
        }
    }

    HeaderLayout { slots }
}
