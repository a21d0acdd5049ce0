//! Client surface for the presentation layer.
//!
//! [`SheetClient`] ties one record kind to a spreadsheet tab: it fetches and
//! reconciles, keeps the current column settings and records, persists the
//! settings per identity and publishes record snapshots to subscribers.
//!
//! All operations serialize on one async mutex, so a reconciliation pass
//! never interleaves with a column or record mutation.

use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::column_model::{
    normalize_header, validate_custom_fields, ColumnDescriptor, CustomColumnDraft,
};
use crate::column_state::{transition, ColumnAction, ColumnSettings};
use crate::config::ClientConfig;
use crate::config_store::{ConfigStore, KeyValueStore};
use crate::error::{FieldErrors, SheetError, SheetResult};
use crate::reconcile::{Clock, ReconcileOutcome, Reconciler, SettingsSink, SystemClock};
use crate::record_kind::RecordKind;
use crate::record_transform::{
    build_record, custom_field_texts, grid_to_records, record_to_row, Record, RecordDraft,
    HEADER_ROW,
};
use crate::sheet_gateway::{
    AccessToken, ColumnSyncReport, SheetHeaderGateway, SheetRef, SheetsTransport,
};

struct ClientState {
    identity: Option<String>,
    credential: Option<AccessToken>,
    settings: ColumnSettings,
    records: Vec<Record>,
    reconciler: Reconciler,
    next_record_seq: u64,
}

impl ClientState {
    fn next_record_id(&mut self, kind: &RecordKind) -> String {
        self.next_record_seq += 1;
        format!("{}_{}", kind.record_id_prefix, self.next_record_seq)
    }

    /// Give freshly read records client ids. A record keeps the id of the
    /// cached record at the same row when its content is unchanged; anything
    /// else gets a new id, so an id never silently names a different row.
    fn assign_record_ids(&mut self, kind: &RecordKind, mut fresh: Vec<Record>) -> Vec<Record> {
        for record in fresh.iter_mut() {
            let reused = self
                .records
                .iter()
                .find(|cached| {
                    cached.row_index == record.row_index
                        && cached.fields == record.fields
                        && cached.custom_fields == record.custom_fields
                })
                .map(|cached| (cached.id.clone(), cached.last_modified));
            match reused {
                Some((id, last_modified)) => {
                    record.id = id;
                    record.last_modified = last_modified;
                }
                None => record.id = self.next_record_id(kind),
            }
        }
        fresh
    }
}

/// Spreadsheet-backed record set for one record kind.
pub struct SheetClient<T: SheetsTransport, S: KeyValueStore, C: Clock = SystemClock> {
    kind: &'static RecordKind,
    config: ClientConfig,
    sheet: SheetRef,
    transport: T,
    store: ConfigStore<S>,
    clock: C,
    state: Mutex<ClientState>,
    records_tx: watch::Sender<Vec<Record>>,
}

impl<T: SheetsTransport, S: KeyValueStore> SheetClient<T, S, SystemClock> {
    pub fn new(
        kind: &'static RecordKind,
        config: ClientConfig,
        transport: T,
        store: S,
    ) -> SheetResult<Self> {
        Self::with_clock(kind, config, transport, store, SystemClock)
    }
}

impl<T: SheetsTransport, S: KeyValueStore, C: Clock> SheetClient<T, S, C> {
    pub fn with_clock(
        kind: &'static RecordKind,
        config: ClientConfig,
        transport: T,
        store: S,
        clock: C,
    ) -> SheetResult<Self> {
        config.validate()?;

        let sheet = SheetRef::new(config.spreadsheet_id.clone(), config.sheet_name.clone());
        let store = ConfigStore::new(store, kind, config.storage_key_prefix.clone());
        let (records_tx, _) = watch::channel(Vec::new());
        let state = ClientState {
            identity: None,
            credential: None,
            settings: ColumnSettings::defaults(kind),
            records: Vec::new(),
            reconciler: Reconciler::new(kind, config.cooldown),
            next_record_seq: 0,
        };

        Ok(Self {
            kind,
            config,
            sheet,
            transport,
            store,
            clock,
            state: Mutex::new(state),
            records_tx,
        })
    }

    pub fn kind(&self) -> &'static RecordKind {
        self.kind
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    /// Scope persisted settings to `identity` (e.g. the signed-in email).
    ///
    /// Migrates a legacy shared blob into the identity's slot first; that
    /// step is best effort.
    pub async fn sign_in(&self, identity: &str) -> SheetResult<ColumnSettings> {
        let mut state = self.state.lock().await;

        if let Err(e) = self.store.migrate(&self.config.legacy_storage_key, identity) {
            warn!(error = %e, "Legacy column settings migration failed");
        }
        let settings = self.store.load(identity)?;

        state.identity = Some(identity.trim().to_string());
        state.settings = settings.clone();
        info!(kind = ?self.kind.id, columns = settings.columns.len(), "Loaded column settings");
        Ok(settings)
    }

    /// Read the sheet, reconcile the column set with its header row and
    /// return the records. On a remote failure the cached records are kept.
    pub async fn fetch_and_reconcile(&self, credential: AccessToken) -> SheetResult<Vec<Record>> {
        if credential.is_empty() {
            return Err(SheetError::ConfigurationMissing("access credential".to_string()));
        }

        let mut state = self.state.lock().await;
        state.credential = Some(credential.clone());

        let grid = match self.gateway(&credential).read_grid().await {
            Ok(grid) => grid,
            Err(e) => {
                warn!(sheet = %self.sheet.sheet_name, error = %e, "Fetch failed, keeping cached records");
                return Err(e);
            }
        };

        let now = self.clock.now();
        let ClientState {
            reconciler,
            settings,
            ..
        } = &mut *state;
        let outcome = reconciler.reconcile(&grid.headers, now, &mut SettingsSink::new(self.kind, settings));

        if let ReconcileOutcome::Completed(report) = &outcome {
            if report.changed() {
                if let Err(e) = self.persist(&state) {
                    warn!(error = %e, "Failed to persist reconciled column settings");
                }
            }
        }

        let records = grid_to_records(self.kind, &grid.headers, &grid.rows, &state.settings.columns);
        let records = state.assign_record_ids(self.kind, records);
        debug!(sheet = %self.sheet.sheet_name, records = records.len(), "Fetched records");
        state.records = records.clone();
        self.publish(&state);
        Ok(records)
    }

    /// Fetch once after the configured delay; failures are only logged.
    pub async fn auto_sync(&self, credential: AccessToken) {
        tokio::time::sleep(self.config.auto_sync_delay).await;
        if let Err(e) = self.fetch_and_reconcile(credential).await {
            warn!(error = %e, "Automatic sync failed");
        }
    }

    pub fn auto_sync_delay(&self) -> Duration {
        self.config.auto_sync_delay
    }

    /// Create a custom column: header row first, then local settings.
    pub async fn add_custom_column(&self, draft: CustomColumnDraft) -> SheetResult<ColumnDescriptor> {
        let mut state = self.state.lock().await;

        if let Some(builtin) = self.kind.builtin_for_header(&draft.header_name) {
            return Err(SheetError::DuplicateColumn {
                header_name: draft.header_name.trim().to_string(),
                existing_id: builtin.key.to_string(),
            });
        }
        let insert_after = draft.insert_after_index;
        let column = draft.into_descriptor(&state.settings.columns)?;
        let credential = Self::credential(&state)?;

        self.gateway(&credential)
            .add_column(&column.header_name, insert_after)
            .await?;

        self.apply(
            &mut state,
            ColumnAction::AddCustomColumn {
                column: column.clone(),
            },
        )?;
        info!(column = %column.header_name, id = %column.id, "Added custom column");
        Ok(column)
    }

    /// Remove a custom column locally, then best effort from the sheet.
    ///
    /// A failed remote delete is logged and not rolled back; the column comes
    /// back on the next reconciliation if it is still in the header row.
    pub async fn remove_custom_column(&self, id: &str) -> SheetResult<()> {
        let mut state = self.state.lock().await;
        let column = self.custom_column(&state, id)?;

        self.apply(&mut state, ColumnAction::RemoveCustomColumn { id: id.to_string() })?;
        info!(column = %column.header_name, id, "Removed custom column");

        match state.credential.clone() {
            Some(credential) => {
                if let Err(e) = self.gateway(&credential).remove_column(&column.header_name).await {
                    warn!(column = %column.header_name, error = %e, "Remote column removal failed");
                }
            }
            None => debug!(column = %column.header_name, "No credential, skipping remote column removal"),
        }
        Ok(())
    }

    pub async fn toggle_visibility(&self, id: &str) -> SheetResult<()> {
        let mut state = self.state.lock().await;
        if state.settings.column(id).is_none() {
            return Err(SheetError::ColumnNotFound(id.to_string()));
        }
        self.apply(&mut state, ColumnAction::ToggleColumnVisibility { id: id.to_string() })
    }

    /// Rename a custom column's header: sheet first, then local settings.
    /// The field, and with it the stored data, is unchanged.
    pub async fn rename_column(&self, id: &str, new_name: &str) -> SheetResult<()> {
        let mut state = self.state.lock().await;
        let column = self.custom_column(&state, id)?;
        let new_name = new_name.trim();

        if normalize_header(new_name).is_empty() {
            let mut errors = FieldErrors::new();
            errors.add("headerName", "Column name must contain at least one letter or digit");
            return Err(SheetError::Validation(errors));
        }
        if let Some(builtin) = self.kind.builtin_for_header(new_name) {
            return Err(SheetError::DuplicateColumn {
                header_name: new_name.to_string(),
                existing_id: builtin.key.to_string(),
            });
        }
        let normalized = normalize_header(new_name);
        if let Some(other) = state
            .settings
            .columns
            .iter()
            .find(|c| c.id != id && c.normalized_header() == normalized)
        {
            return Err(SheetError::DuplicateColumn {
                header_name: new_name.to_string(),
                existing_id: other.id.clone(),
            });
        }

        let credential = Self::credential(&state)?;
        self.gateway(&credential)
            .rename_column(&column.header_name, new_name)
            .await?;

        self.apply(
            &mut state,
            ColumnAction::RenameColumn {
                id: id.to_string(),
                header_name: new_name.to_string(),
            },
        )?;
        info!(id, from = %column.header_name, to = new_name, "Renamed custom column");
        Ok(())
    }

    pub async fn reorder_columns(&self, ids: Vec<String>) -> SheetResult<()> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, ColumnAction::ReorderColumns { ids })
    }

    pub async fn set_records_per_page(&self, records_per_page: u32) -> SheetResult<()> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, ColumnAction::SetRecordsPerPage { records_per_page })
    }

    /// Built-in columns and preferences back to defaults; custom columns stay.
    pub async fn reset_columns(&self) -> SheetResult<()> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, ColumnAction::ResetToDefaults)
    }

    /// Write every local custom column to the header row and drop empty
    /// undeclared columns.
    pub async fn push_column_settings(&self) -> SheetResult<ColumnSyncReport> {
        let state = self.state.lock().await;
        let credential = Self::credential(&state)?;
        self.gateway(&credential)
            .sync_column_settings(self.kind, &state.settings.columns)
            .await
    }

    /// Append a new row. Custom values are validated before anything is sent.
    pub async fn create_record(&self, draft: RecordDraft) -> SheetResult<Record> {
        let mut state = self.state.lock().await;
        validate_custom_fields(&state.settings.columns, &draft.custom_fields)?;
        let credential = Self::credential(&state)?;
        let gateway = self.gateway(&credential);

        let headers = self.live_headers(&gateway).await?;
        let mut record = build_record(self.kind, &state.settings.columns, &draft, "", 0);
        let row = record_to_row(self.kind, &record, &headers, &state.settings.columns);

        let appended = gateway.append_row(row).await?;
        let row_index = appended.unwrap_or_else(|| {
            state
                .records
                .iter()
                .map(|r| r.row_index + 1)
                .max()
                .unwrap_or(HEADER_ROW + 1)
        });

        record.id = state.next_record_id(self.kind);
        record.row_index = row_index;
        record.touch(self.clock.now());

        state.records.retain(|r| r.row_index != row_index);
        state.records.push(record.clone());
        state.records.sort_by_key(|r| r.row_index);
        self.publish(&state);

        info!(id = %record.id, row = row_index, "Created record");
        Ok(record)
    }

    /// Overwrite the record's row. Last write wins for the whole row.
    ///
    /// A record whose row has moved since the caller read it is rejected
    /// with `StaleRecord`; nothing is written.
    pub async fn update_record(&self, record: Record) -> SheetResult<Record> {
        let mut state = self.state.lock().await;
        let position = state
            .records
            .iter()
            .position(|r| r.id == record.id)
            .ok_or_else(|| SheetError::RecordNotFound(record.id.clone()))?;
        if state.records[position].row_index != record.row_index {
            warn!(
                id = %record.id,
                expected = state.records[position].row_index,
                got = record.row_index,
                "Rejecting update of a stale record"
            );
            return Err(SheetError::StaleRecord(record.id));
        }
        validate_custom_fields(&state.settings.columns, &custom_field_texts(&record))?;
        let credential = Self::credential(&state)?;
        let gateway = self.gateway(&credential);

        let row_index = state.records[position].row_index;
        let headers = self.live_headers(&gateway).await?;
        let row = record_to_row(self.kind, &record, &headers, &state.settings.columns);
        gateway.write_row(row_index, row).await?;

        let mut updated = record;
        updated.row_index = row_index;
        updated.touch(self.clock.now());
        state.records[position] = updated.clone();
        self.publish(&state);

        debug!(id = %updated.id, row = row_index, "Updated record");
        Ok(updated)
    }

    /// Delete the record's row remotely, then locally. Rows below move up;
    /// their ids stay.
    pub async fn delete_record(&self, id: &str) -> SheetResult<()> {
        let mut state = self.state.lock().await;
        let row_index = state
            .records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.row_index)
            .ok_or_else(|| SheetError::RecordNotFound(id.to_string()))?;
        let credential = Self::credential(&state)?;

        self.gateway(&credential).delete_row(row_index).await?;

        state.records.retain(|r| r.row_index != row_index);
        for record in state.records.iter_mut().filter(|r| r.row_index > row_index) {
            record.row_index -= 1;
        }
        self.publish(&state);

        info!(id, row = row_index, "Deleted record");
        Ok(())
    }

    pub async fn columns(&self) -> Vec<ColumnDescriptor> {
        self.state.lock().await.settings.columns.clone()
    }

    pub async fn settings(&self) -> ColumnSettings {
        self.state.lock().await.settings.clone()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.state.lock().await.records.clone()
    }

    /// Record snapshots, published after every fetch and record mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Record>> {
        self.records_tx.subscribe()
    }

    fn gateway<'a>(&'a self, credential: &'a AccessToken) -> SheetHeaderGateway<'a, T> {
        SheetHeaderGateway::new(&self.transport, credential, &self.sheet)
    }

    fn credential(state: &ClientState) -> SheetResult<AccessToken> {
        state
            .credential
            .clone()
            .ok_or_else(|| SheetError::ConfigurationMissing("access credential".to_string()))
    }

    fn custom_column(&self, state: &ClientState, id: &str) -> SheetResult<ColumnDescriptor> {
        let column = state
            .settings
            .column(id)
            .ok_or_else(|| SheetError::ColumnNotFound(id.to_string()))?;
        if !column.is_custom {
            return Err(SheetError::BuiltinColumn(column.header_name.clone()));
        }
        Ok(column.clone())
    }

    async fn live_headers(&self, gateway: &SheetHeaderGateway<'_, T>) -> SheetResult<Vec<String>> {
        let headers = gateway.get_headers().await?;
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(SheetError::ColumnNotFound("header row".to_string()));
        }
        Ok(headers)
    }

    fn apply(&self, state: &mut ClientState, action: ColumnAction) -> SheetResult<()> {
        let current = std::mem::replace(&mut state.settings, ColumnSettings::defaults(self.kind));
        state.settings = transition(self.kind, current, action);
        self.persist(state)
    }

    fn persist(&self, state: &ClientState) -> SheetResult<()> {
        match &state.identity {
            Some(identity) => self.store.save(identity, &state.settings),
            None => {
                debug!("Not signed in, column settings kept in memory only");
                Ok(())
            }
        }
    }

    fn publish(&self, state: &ClientState) {
        self.records_tx.send_replace(state.records.clone());
    }
}

#[cfg(test)]
mod tests;
