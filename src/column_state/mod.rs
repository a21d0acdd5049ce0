//! Column set state and its reducer.
//!
//! [`ColumnSettings`] is the whole persisted per-user view: the column set
//! plus display preferences. All changes go through [`transition`], a pure
//! function over a tagged [`ColumnAction`], and every add path checks the
//! three-way collision rule so no reachable state holds two columns with the
//! same id, field or normalized header.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::column_model::{deduplicate_batch, find_collision, normalize_header, ColumnDescriptor};
use crate::error::SheetResult;
use crate::record_kind::{RecordKind, RecordKindId};

pub const DEFAULT_RECORDS_PER_PAGE: u32 = 25;
pub const DEFAULT_SYNC_INTERVAL_SECS: u32 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

fn default_records_per_page() -> u32 {
    DEFAULT_RECORDS_PER_PAGE
}

fn default_sync_interval() -> u32 {
    DEFAULT_SYNC_INTERVAL_SECS
}

/// Persisted column set and display preferences for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSettings {
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default = "default_records_per_page")]
    pub records_per_page: u32,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u32,
}

impl ColumnSettings {
    /// Built-in columns only, default preferences.
    pub fn defaults(kind: &RecordKind) -> Self {
        Self {
            columns: kind.default_columns(),
            records_per_page: DEFAULT_RECORDS_PER_PAGE,
            theme: Theme::default(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }

    pub fn column(&self, id: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn custom_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_custom)
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.visible)
    }
}

/// Every change a column set can go through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ColumnAction {
    SetRecordsPerPage { records_per_page: u32 },
    ToggleColumnVisibility { id: String },
    AddCustomColumn { column: ColumnDescriptor },
    AddCustomColumnsBatch { columns: Vec<ColumnDescriptor> },
    RemoveCustomColumn { id: String },
    RemoveCustomColumnsBatch { ids: Vec<String> },
    /// Display name only; the field (and stored data) stays.
    RenameColumn { id: String, header_name: String },
    /// Listed ids first in the given order, the rest after in their current order.
    ReorderColumns { ids: Vec<String> },
    SetSettings { settings: ColumnSettings },
    /// Built-in columns and preferences back to defaults; custom columns are
    /// kept after the built-ins.
    ResetToDefaults,
}

/// A custom column may not claim a header the kind reads as built-in.
fn acceptable_custom(kind: &RecordKind, column: &ColumnDescriptor) -> bool {
    column.is_custom
        && !column.field.is_empty()
        && !column.normalized_header().is_empty()
        && !kind.is_builtin_header(&column.header_name)
}

fn add_columns(
    kind: &RecordKind,
    mut columns: Vec<ColumnDescriptor>,
    additions: Vec<ColumnDescriptor>,
) -> Vec<ColumnDescriptor> {
    for column in deduplicate_batch(additions) {
        if !acceptable_custom(kind, &column) {
            debug!(column = %column.header_name, "Ignoring column that is not a valid custom column");
            continue;
        }
        if let Some(existing) = find_collision(&column, &columns) {
            debug!(
                column = %column.header_name,
                existing = %existing.id,
                "Ignoring column that collides with an existing one"
            );
            continue;
        }
        columns.push(column);
    }
    columns
}

fn sort_by_order(columns: &mut [ColumnDescriptor]) {
    columns.sort_by_key(|c| c.order);
}

fn renumber(columns: &mut [ColumnDescriptor]) {
    for (i, column) in columns.iter_mut().enumerate() {
        column.order = i as u32;
    }
}

/// Apply one action. Pure: the input state is consumed and a new one returned.
pub fn transition(kind: &RecordKind, state: ColumnSettings, action: ColumnAction) -> ColumnSettings {
    let mut next = state;
    match action {
        ColumnAction::SetRecordsPerPage { records_per_page } => {
            next.records_per_page = records_per_page.max(1);
        }
        ColumnAction::ToggleColumnVisibility { id } => {
            if let Some(column) = next.columns.iter_mut().find(|c| c.id == id) {
                column.visible = !column.visible;
            }
        }
        ColumnAction::AddCustomColumn { column } => {
            next.columns = add_columns(kind, next.columns, vec![column]);
        }
        ColumnAction::AddCustomColumnsBatch { columns } => {
            next.columns = add_columns(kind, next.columns, columns);
        }
        ColumnAction::RemoveCustomColumn { id } => {
            next.columns.retain(|c| !(c.is_custom && c.id == id));
        }
        ColumnAction::RemoveCustomColumnsBatch { ids } => {
            next.columns
                .retain(|c| !(c.is_custom && ids.iter().any(|id| *id == c.id)));
        }
        ColumnAction::RenameColumn { id, header_name } => {
            let header_name = header_name.trim().to_string();
            let normalized = normalize_header(&header_name);
            let target = next.columns.iter().position(|c| c.id == id);
            let clashes = next
                .columns
                .iter()
                .any(|c| c.id != id && c.normalized_header() == normalized);

            if let Some(index) = target {
                let is_custom = next.columns[index].is_custom;
                let renames_into_builtin = is_custom && kind.is_builtin_header(&header_name);
                if normalized.is_empty() || clashes || renames_into_builtin {
                    debug!(column = %id, to = %header_name, "Rejected column rename");
                } else {
                    next.columns[index].header_name = header_name;
                }
            }
        }
        ColumnAction::ReorderColumns { ids } => {
            let mut listed: Vec<ColumnDescriptor> = Vec::with_capacity(next.columns.len());
            for id in &ids {
                if let Some(pos) = next.columns.iter().position(|c| c.id == *id) {
                    listed.push(next.columns.remove(pos));
                }
            }
            listed.append(&mut next.columns);
            renumber(&mut listed);
            next.columns = listed;
        }
        ColumnAction::SetSettings { settings } => {
            let mut columns = deduplicate_batch(settings.columns);
            columns.retain(|c| !c.is_custom || acceptable_custom(kind, c));
            next = ColumnSettings {
                columns,
                records_per_page: settings.records_per_page.max(1),
                ..settings
            };
        }
        ColumnAction::ResetToDefaults => {
            let customs: Vec<ColumnDescriptor> =
                next.columns.into_iter().filter(|c| c.is_custom).collect();
            let mut columns = add_columns(kind, kind.default_columns(), customs);
            renumber(&mut columns);
            next = ColumnSettings {
                columns,
                ..ColumnSettings::defaults(kind)
            };
        }
    }
    sort_by_order(&mut next.columns);
    next
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionInput {
    pub kind: RecordKindId,
    /// Defaults for the kind when absent
    #[serde(default)]
    pub state: Option<ColumnSettings>,
    pub action: ColumnAction,
}

/// Apply one action using JSON strings.
pub fn transition_json(input_json: &str) -> SheetResult<String> {
    let input: TransitionInput = serde_json::from_str(input_json)?;
    let kind = input.kind.kind();
    let state = input.state.unwrap_or_else(|| ColumnSettings::defaults(kind));
    Ok(serde_json::to_string(&transition(kind, state, input.action))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_model::{is_collision_free, ColumnType};
    use crate::record_kind::{SIGN_INS, STUDENTS};
    use proptest::prelude::*;

    fn custom(id: &str, header: &str) -> ColumnDescriptor {
        ColumnDescriptor::custom(id, header, ColumnType::String).with_order(100)
    }

    fn apply(state: ColumnSettings, actions: Vec<ColumnAction>) -> ColumnSettings {
        actions
            .into_iter()
            .fold(state, |s, a| transition(&STUDENTS, s, a))
    }

    #[test]
    fn test_transition_json() {
        let output = transition_json(
            r#"{"kind":"students","action":{"type":"setRecordsPerPage","recordsPerPage":50}}"#,
        )
        .unwrap();
        let settings: ColumnSettings = serde_json::from_str(&output).unwrap();
        assert_eq!(settings.records_per_page, 50);
        assert_eq!(settings.columns.len(), STUDENTS.fields.len());

        assert!(transition_json(r#"{"kind":"students","action":{"type":"explode"}}"#).is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = ColumnSettings::defaults(&SIGN_INS);
        assert_eq!(settings.columns.len(), SIGN_INS.fields.len());
        assert_eq!(settings.records_per_page, DEFAULT_RECORDS_PER_PAGE);
        assert!(settings.custom_columns().next().is_none());
    }

    #[test]
    fn test_add_rejects_collisions_and_builtin_headers() {
        let state = apply(
            ColumnSettings::defaults(&STUDENTS),
            vec![
                ColumnAction::AddCustomColumn { column: custom("custom_1", "Notes") },
                ColumnAction::AddCustomColumn { column: custom("custom_2", "notes!") },
                ColumnAction::AddCustomColumn { column: custom("custom_3", "Date of Birth") },
                ColumnAction::AddCustomColumnsBatch {
                    columns: vec![
                        custom("custom_4", "Allergies"),
                        custom("custom_5", "ALLERGIES"),
                        custom("custom_1", "Bus Route"),
                    ],
                },
            ],
        );

        let headers: Vec<&str> = state.custom_columns().map(|c| c.header_name.as_str()).collect();
        assert_eq!(headers, vec!["Notes", "Allergies"]);
        assert!(is_collision_free(&state.columns));
    }

    #[test]
    fn test_remove_only_touches_custom_columns() {
        let state = apply(
            ColumnSettings::defaults(&STUDENTS),
            vec![
                ColumnAction::AddCustomColumnsBatch {
                    columns: vec![custom("custom_1", "Notes"), custom("custom_2", "Allergies")],
                },
                ColumnAction::RemoveCustomColumn { id: "email".into() },
                ColumnAction::RemoveCustomColumnsBatch {
                    ids: vec!["custom_1".into(), "custom_2".into(), "missing".into()],
                },
            ],
        );
        assert_eq!(state, ColumnSettings::defaults(&STUDENTS));
    }

    #[test]
    fn test_toggle_and_records_per_page() {
        let state = apply(
            ColumnSettings::defaults(&STUDENTS),
            vec![
                ColumnAction::ToggleColumnVisibility { id: "email".into() },
                ColumnAction::SetRecordsPerPage { records_per_page: 0 },
            ],
        );
        assert!(!state.column("email").unwrap().visible);
        assert_eq!(state.records_per_page, 1);

        let state = transition(&STUDENTS, state, ColumnAction::ToggleColumnVisibility { id: "email".into() });
        assert!(state.column("email").unwrap().visible);
    }

    #[test]
    fn test_rename_keeps_field_and_rejects_clashes() {
        let state = apply(
            ColumnSettings::defaults(&STUDENTS),
            vec![
                ColumnAction::AddCustomColumnsBatch {
                    columns: vec![custom("custom_1", "Notes"), custom("custom_2", "Allergies")],
                },
                ColumnAction::RenameColumn { id: "custom_1".into(), header_name: " Comments ".into() },
            ],
        );
        let renamed = state.column("custom_1").unwrap();
        assert_eq!(renamed.header_name, "Comments");
        assert_eq!(renamed.field, "notes");

        for rejected in ["allergies", "  ", "Parent Email"] {
            let after = transition(
                &STUDENTS,
                state.clone(),
                ColumnAction::RenameColumn { id: "custom_1".into(), header_name: rejected.into() },
            );
            assert_eq!(after, state, "{rejected}");
        }
    }

    #[test]
    fn test_reorder_puts_listed_first() {
        let state = apply(
            ColumnSettings::defaults(&SIGN_INS),
            vec![ColumnAction::ReorderColumns {
                ids: vec!["purpose".into(), "nope".into(), "email".into()],
            }],
        );
        let ids: Vec<&str> = state.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["purpose", "email", "first_name", "last_name", "signed_in_at", "signed_out"]
        );
        assert!(state.columns.iter().enumerate().all(|(i, c)| c.order == i as u32));
    }

    #[test]
    fn test_reset_keeps_custom_columns() {
        let state = apply(
            ColumnSettings::defaults(&STUDENTS),
            vec![
                ColumnAction::AddCustomColumn { column: custom("custom_1", "Notes") },
                ColumnAction::ToggleColumnVisibility { id: "first_name".into() },
                ColumnAction::SetRecordsPerPage { records_per_page: 100 },
                ColumnAction::ResetToDefaults,
            ],
        );
        assert!(state.column("first_name").unwrap().visible);
        assert_eq!(state.records_per_page, DEFAULT_RECORDS_PER_PAGE);
        assert_eq!(state.columns.last().unwrap().id, "custom_1");
        assert_eq!(state.columns.last().unwrap().order, STUDENTS.fields.len() as u32);
    }

    #[test]
    fn test_set_settings_deduplicates() {
        let mut incoming = ColumnSettings::defaults(&STUDENTS);
        incoming.columns.push(custom("custom_1", "Notes"));
        incoming.columns.push(custom("custom_2", "NOTES"));
        incoming.theme = Theme::Dark;

        let state = transition(
            &STUDENTS,
            ColumnSettings::defaults(&STUDENTS),
            ColumnAction::SetSettings { settings: incoming },
        );
        assert_eq!(state.custom_columns().count(), 1);
        assert_eq!(state.theme, Theme::Dark);
    }

    #[test]
    fn test_action_json_shape() {
        let action: ColumnAction = serde_json::from_str(
            r#"{"type":"renameColumn","id":"custom_1","headerName":"Comments"}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            ColumnAction::RenameColumn { id: "custom_1".into(), header_name: "Comments".into() }
        );

        let json = serde_json::to_value(ColumnAction::ResetToDefaults).unwrap();
        assert_eq!(json["type"], "resetToDefaults");

        let settings: ColumnSettings = serde_json::from_str(r#"{"columns":[]}"#).unwrap();
        assert_eq!(settings.records_per_page, DEFAULT_RECORDS_PER_PAGE);
        assert_eq!(settings.sync_interval_secs, DEFAULT_SYNC_INTERVAL_SECS);
    }

    const HEADERS: &[&str] = &["Notes", "notes", "Allergies", "Bus Route", "bus-route", "Email", "Locker #"];

    fn action_strategy() -> impl Strategy<Value = ColumnAction> {
        let header = proptest::sample::select(HEADERS);
        let id = (0u8..6).prop_map(|n| format!("custom_{}", n));
        prop_oneof![
            (id.clone(), header.clone()).prop_map(|(id, h)| ColumnAction::AddCustomColumn {
                column: ColumnDescriptor::custom(id, h, ColumnType::String),
            }),
            proptest::collection::vec((id.clone(), header.clone()), 0..4).prop_map(|items| {
                ColumnAction::AddCustomColumnsBatch {
                    columns: items
                        .into_iter()
                        .map(|(id, h)| ColumnDescriptor::custom(id, h, ColumnType::String))
                        .collect(),
                }
            }),
            id.clone().prop_map(|id| ColumnAction::RemoveCustomColumn { id }),
            (id.clone(), header).prop_map(|(id, h)| ColumnAction::RenameColumn {
                id,
                header_name: h.to_string(),
            }),
            proptest::collection::vec(id, 0..4).prop_map(|ids| ColumnAction::ReorderColumns { ids }),
            Just(ColumnAction::ResetToDefaults),
        ]
    }

    proptest! {
        #[test]
        fn prop_collision_invariant_holds(actions in proptest::collection::vec(action_strategy(), 0..24)) {
            let mut state = ColumnSettings::defaults(&STUDENTS);
            for action in actions {
                state = transition(&STUDENTS, state, action);
                prop_assert!(is_collision_free(&state.columns));
            }
        }
    }
}
