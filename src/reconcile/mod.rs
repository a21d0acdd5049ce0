//! Reconciliation of the local column set with the live header row.
//!
//! A pass runs behind a [`CooldownGate`]: triggers arriving within the
//! window of the previous pass are dropped. An accepted pass first removes
//! custom columns that vanished remotely (local only), then adds newly
//! discovered columns in a single batch.

mod clock;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::column_model::ColumnDescriptor;
use crate::column_state::{transition, ColumnAction, ColumnSettings};
use crate::discovery::{candidates_to_columns, detect_new_custom_columns, diff_columns, RenamedColumn};
use crate::record_kind::RecordKind;

pub use clock::{Clock, ManualClock, SystemClock};

/// Minimum spacing between two reconciliation passes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Idle,
    CooldownActive,
}

/// Drops triggers that arrive within `window` of the last accepted one.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    window: Duration,
    last_sync: Option<DateTime<Utc>>,
    phase: SyncPhase,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sync: None,
            phase: SyncPhase::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Accept a trigger at `now`, entering `CooldownActive`, or refuse it.
    pub fn try_begin(&mut self, now: DateTime<Utc>) -> bool {
        if self.phase == SyncPhase::CooldownActive {
            return false;
        }
        if let Some(last) = self.last_sync {
            let elapsed = now.signed_duration_since(last);
            // A clock that went backwards counts as an expired window.
            if elapsed >= chrono::Duration::zero()
                && elapsed < chrono::Duration::milliseconds(self.window.as_millis() as i64)
            {
                return false;
            }
        }
        self.last_sync = Some(now);
        self.phase = SyncPhase::CooldownActive;
        true
    }

    pub fn finish(&mut self) {
        self.phase = SyncPhase::Idle;
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Receiver of a pass's local changes.
pub trait ColumnSetSink {
    /// Current column set.
    fn columns(&self) -> &[ColumnDescriptor];

    /// Drop columns already gone remotely. Must not touch the sheet.
    fn remove_columns(&mut self, columns: &[ColumnDescriptor]);

    /// Add one batch of discovered columns.
    fn add_columns(&mut self, columns: Vec<ColumnDescriptor>);
}

/// Sink applying changes to [`ColumnSettings`] through the reducer.
pub struct SettingsSink<'a> {
    kind: &'a RecordKind,
    settings: &'a mut ColumnSettings,
}

impl<'a> SettingsSink<'a> {
    pub fn new(kind: &'a RecordKind, settings: &'a mut ColumnSettings) -> Self {
        Self { kind, settings }
    }

    fn apply(&mut self, action: ColumnAction) {
        let current = std::mem::replace(self.settings, ColumnSettings::defaults(self.kind));
        *self.settings = transition(self.kind, current, action);
    }
}

impl ColumnSetSink for SettingsSink<'_> {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.settings.columns
    }

    fn remove_columns(&mut self, columns: &[ColumnDescriptor]) {
        let ids = columns.iter().map(|c| c.id.clone()).collect();
        self.apply(ColumnAction::RemoveCustomColumnsBatch { ids });
    }

    fn add_columns(&mut self, columns: Vec<ColumnDescriptor>) {
        self.apply(ColumnAction::AddCustomColumnsBatch { columns });
    }
}

/// Changes made by one accepted pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub added: Vec<ColumnDescriptor>,
    pub removed: Vec<ColumnDescriptor>,
    /// Removed/added pairs that look like a remote rename; informational
    pub renamed: Vec<RenamedColumn>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    /// Dropped by the cooldown gate
    Suppressed,
    Completed(ReconcileReport),
}

impl ReconcileOutcome {
    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            ReconcileOutcome::Suppressed => None,
            ReconcileOutcome::Completed(report) => Some(report),
        }
    }
}

/// Gated discovery/deletion for one record kind.
#[derive(Debug, Clone)]
pub struct Reconciler {
    kind: &'static RecordKind,
    gate: CooldownGate,
}

impl Reconciler {
    pub fn new(kind: &'static RecordKind, cooldown: Duration) -> Self {
        Self {
            kind,
            gate: CooldownGate::new(cooldown),
        }
    }

    pub fn kind(&self) -> &'static RecordKind {
        self.kind
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// Run one pass of `headers` against the sink's columns, unless the
    /// cooldown gate drops it.
    pub fn reconcile<S: ColumnSetSink + ?Sized>(
        &mut self,
        headers: &[String],
        now: DateTime<Utc>,
        sink: &mut S,
    ) -> ReconcileOutcome {
        if !self.gate.try_begin(now) {
            debug!(kind = ?self.kind.id, "Reconciliation suppressed by cooldown");
            return ReconcileOutcome::Suppressed;
        }

        let report = self.run_pass(headers, sink);
        self.gate.finish();
        ReconcileOutcome::Completed(report)
    }

    fn run_pass<S: ColumnSetSink + ?Sized>(&self, headers: &[String], sink: &mut S) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        // An empty header row means the read came back blank, not that every
        // custom column was deleted.
        if headers.iter().all(|h| h.trim().is_empty()) {
            warn!(kind = ?self.kind.id, "Header row is empty, skipping reconciliation");
            return report;
        }

        let diff = diff_columns(self.kind, headers, sink.columns());
        for pair in &diff.renamed {
            debug!(
                from = %pair.previous.header_name,
                to = %pair.current.header_name,
                "Header looks renamed remotely"
            );
        }
        report.renamed = diff.renamed;

        let deleted = diff.deleted;
        if !deleted.is_empty() {
            debug!(
                columns = ?deleted.iter().map(|c| c.header_name.as_str()).collect::<Vec<_>>(),
                "Removing custom columns deleted remotely"
            );
            sink.remove_columns(&deleted);
            report.removed = deleted;
        }

        let known = sink.columns().to_vec();
        let batch = candidates_to_columns(detect_new_custom_columns(self.kind, headers, &known), &known);
        if !batch.is_empty() {
            debug!(
                columns = ?batch.iter().map(|c| c.header_name.as_str()).collect::<Vec<_>>(),
                "Adding discovered custom columns"
            );
            sink.add_columns(batch.clone());
            report.added = batch;
        }

        if report.changed() {
            info!(
                kind = ?self.kind.id,
                added = report.added.len(),
                removed = report.removed.len(),
                "Reconciled column set with sheet headers"
            );
        }
        report
    }
}
