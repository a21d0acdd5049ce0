//! Sheetbridge Core Library
//!
//! Client core for keeping typed records in a shared spreadsheet, including:
//! - **column_model**: Column identity, header normalization and field name generation
//! - **discovery**: Detects custom columns added or removed directly in the sheet
//! - **column_state**: Column set reducer with the three-way collision rule
//! - **reconcile**: Cooldown-gated self-healing of the column set after each fetch
//! - **sheet_gateway**: Header-row edits and grid I/O over a spreadsheet transport
//! - **record_transform**: Grid rows <-> typed records, driven by the live header row
//! - **client**: Ties the above together for one record kind and one signed-in identity
//!
//! Pure pieces accept data as JSON and return results as JSON, so the browser
//! can call them directly. The remote spreadsheet and local storage sit behind
//! the [`SheetsTransport`] and [`KeyValueStore`] traits.
//!
//! # Example (conceptual)
//! ```ignore
//! let config = ClientConfig::from_env(&STUDENTS)?;
//! let client = SheetClient::new(&STUDENTS, config, transport, store)?;
//! client.sign_in("office@example.org").await?;
//! client.fetch_and_reconcile(token).await?;
//! let notes = client.add_custom_column(draft).await?;
//! ```

pub mod client;
pub mod column_model;
pub mod column_state;
pub mod config;
pub mod config_store;
pub mod discovery;
pub mod error;
pub mod reconcile;
pub mod record_kind;
pub mod record_transform;
pub mod sheet_gateway;

pub use client::SheetClient;
pub use column_model::{
    generate_field_name, normalize_header, validate_custom_fields, ColumnDescriptor, ColumnType,
    CustomColumnDraft,
};
pub use column_state::{transition, ColumnAction, ColumnSettings};
pub use config::ClientConfig;
pub use config_store::{ConfigStore, KeyValueStore, MemoryStore};
pub use discovery::{
    detect_custom_columns, detect_deleted_custom_columns, detect_new_custom_columns,
    diff_columns, CandidateColumn, ColumnDiff,
};
pub use error::{FieldErrors, SheetError, SheetResult};
pub use reconcile::{Clock, ReconcileOutcome, ReconcileReport, Reconciler, SystemClock};
pub use record_kind::{RecordKind, RecordKindId, SIGN_INS, STUDENTS};
pub use record_transform::{grid_to_records, record_to_row, CellValue, Record, RecordDraft};
pub use sheet_gateway::{AccessToken, InMemorySheets, SheetHeaderGateway, SheetRef, SheetsTransport};

// WASM bindings
#[cfg(feature = "wasm")]
pub mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::*;
