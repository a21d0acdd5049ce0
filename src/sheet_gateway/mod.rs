//! Sheet header gateway.
//!
//! The raw HTTP calls live behind [`SheetsTransport`], supplied by the host.
//! This module builds the column-structural operations on top of it: reading
//! the header row, inserting/renaming/deleting columns by header name and
//! pushing a local column set out to the sheet.
//!
//! Every remote failure is returned to the caller as a typed error. Nothing
//! is retried here.

pub mod a1;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::column_model::{generate_field_name, normalize_header, ColumnDescriptor};
use crate::error::{SheetError, SheetResult};
use crate::record_kind::RecordKind;

pub use memory::{InMemorySheets, TransportOp};

/// Opaque access credential forwarded to the transport.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// The spreadsheet and tab an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRef {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

impl SheetRef {
    pub fn new(spreadsheet_id: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
        }
    }
}

/// Grid properties of one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDimensions {
    /// Numeric tab id used by structural requests
    pub sheet_id: i64,
    pub row_count: u32,
    pub column_count: u32,
}

/// Response of an append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResult {
    /// e.g. `Students!A7:F7`
    pub updated_range: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dimension {
    Rows,
    Columns,
}

/// One structural batch request. Indices are 0-based, `end_index` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructuralOp {
    InsertDimension {
        sheet_id: i64,
        dimension: Dimension,
        start_index: u32,
        end_index: u32,
    },
    DeleteDimension {
        sheet_id: i64,
        dimension: Dimension,
        start_index: u32,
        end_index: u32,
    },
    AutoResizeDimensions {
        sheet_id: i64,
        dimension: Dimension,
        start_index: u32,
        end_index: u32,
    },
}

/// HTTP collaborator for the spreadsheet backend.
///
/// Implementations should impose their own request timeout; the core does not
/// cancel in-flight calls.
#[async_trait]
pub trait SheetsTransport: Send + Sync {
    /// Read a range as rows of cell text (trailing blanks may be omitted).
    async fn read_range(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        range: &str,
    ) -> SheetResult<Vec<Vec<String>>>;

    /// Overwrite a range starting at its top-left cell.
    async fn write_range(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> SheetResult<()>;

    /// Append one row after the last non-empty row.
    async fn append_row(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        values: Vec<String>,
    ) -> SheetResult<AppendResult>;

    /// Apply structural requests in order.
    async fn batch_structural_update(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        requests: Vec<StructuralOp>,
    ) -> SheetResult<()>;

    async fn get_sheet_dimensions(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
    ) -> SheetResult<SheetDimensions>;
}

#[async_trait]
impl<T: SheetsTransport + ?Sized> SheetsTransport for std::sync::Arc<T> {
    async fn read_range(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        range: &str,
    ) -> SheetResult<Vec<Vec<String>>> {
        (**self).read_range(token, sheet, range).await
    }

    async fn write_range(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> SheetResult<()> {
        (**self).write_range(token, sheet, range, values).await
    }

    async fn append_row(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        values: Vec<String>,
    ) -> SheetResult<AppendResult> {
        (**self).append_row(token, sheet, values).await
    }

    async fn batch_structural_update(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        requests: Vec<StructuralOp>,
    ) -> SheetResult<()> {
        (**self).batch_structural_update(token, sheet, requests).await
    }

    async fn get_sheet_dimensions(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
    ) -> SheetResult<SheetDimensions> {
        (**self).get_sheet_dimensions(token, sheet).await
    }
}

/// Outcome of [`SheetHeaderGateway::sync_column_settings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSyncReport {
    /// Headers written for local custom columns missing remotely
    pub added: Vec<String>,
    /// Empty remote columns not declared locally, deleted
    pub removed: Vec<String>,
    /// (old header, new header) pairs rewritten to match local names
    pub renamed: Vec<(String, String)>,
    /// Undeclared remote columns kept because they hold data
    pub retained: Vec<String>,
}

/// Header row plus data rows, as read in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetGrid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Column-structural operations for one tab, bound to a credential.
pub struct SheetHeaderGateway<'a, T: SheetsTransport + ?Sized> {
    transport: &'a T,
    token: &'a AccessToken,
    sheet: &'a SheetRef,
}

impl<'a, T: SheetsTransport + ?Sized> SheetHeaderGateway<'a, T> {
    pub fn new(transport: &'a T, token: &'a AccessToken, sheet: &'a SheetRef) -> Self {
        Self {
            transport,
            token,
            sheet,
        }
    }

    pub fn sheet(&self) -> &SheetRef {
        self.sheet
    }

    /// Current header row (row 1).
    pub async fn get_headers(&self) -> SheetResult<Vec<String>> {
        let rows = self
            .transport
            .read_range(self.token, self.sheet, &a1::header_range())
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Header row and every data row below it.
    pub async fn read_grid(&self) -> SheetResult<SheetGrid> {
        let mut rows = self
            .transport
            .read_range(self.token, self.sheet, &a1::grid_range())
            .await?
            .into_iter();
        let headers = rows.next().unwrap_or_default();
        Ok(SheetGrid {
            headers,
            rows: rows.collect(),
        })
    }

    /// 0-based index of the header matching `name` after normalization.
    pub fn find_header(headers: &[String], name: &str) -> Option<usize> {
        let target = normalize_header(name);
        if target.is_empty() {
            return None;
        }
        headers.iter().position(|h| normalize_header(h) == target)
    }

    /// Write `name` as a new header.
    ///
    /// Appends after the last header unless `insert_after_index` is given, in
    /// which case existing columns right of it are shifted. Inserts a grid
    /// column first whenever the target is not an existing blank column.
    /// Uniqueness is the caller's job. Returns the new column's index.
    pub async fn add_column(
        &self,
        name: &str,
        insert_after_index: Option<usize>,
    ) -> SheetResult<usize> {
        let headers = self.get_headers().await?;
        let target = insert_after_index
            .map(|i| i + 1)
            .unwrap_or(headers.len())
            .min(headers.len());

        let dimensions = self
            .transport
            .get_sheet_dimensions(self.token, self.sheet)
            .await?;

        if target < headers.len() || target >= dimensions.column_count as usize {
            debug!(
                sheet = %self.sheet.sheet_name,
                index = target,
                "Inserting grid column before writing header"
            );
            self.transport
                .batch_structural_update(
                    self.token,
                    self.sheet,
                    vec![StructuralOp::InsertDimension {
                        sheet_id: dimensions.sheet_id,
                        dimension: Dimension::Columns,
                        start_index: target as u32,
                        end_index: target as u32 + 1,
                    }],
                )
                .await?;
        }

        self.transport
            .write_range(
                self.token,
                self.sheet,
                &a1::header_cell(target),
                vec![vec![name.to_string()]],
            )
            .await?;

        info!(sheet = %self.sheet.sheet_name, column = name, index = target, "Added sheet column");
        Ok(target)
    }

    /// Overwrite the header cell currently holding `old_name`.
    pub async fn rename_column(&self, old_name: &str, new_name: &str) -> SheetResult<()> {
        let headers = self.get_headers().await?;
        let index = Self::find_header(&headers, old_name)
            .ok_or_else(|| SheetError::ColumnNotFound(old_name.to_string()))?;

        self.transport
            .write_range(
                self.token,
                self.sheet,
                &a1::header_cell(index),
                vec![vec![new_name.to_string()]],
            )
            .await?;

        info!(sheet = %self.sheet.sheet_name, from = old_name, to = new_name, "Renamed sheet column");
        Ok(())
    }

    /// Delete the whole grid column headed `name`.
    ///
    /// Does not look at the column's data; see [`Self::column_has_data`].
    pub async fn remove_column(&self, name: &str) -> SheetResult<()> {
        let headers = self.get_headers().await?;
        let index = Self::find_header(&headers, name)
            .ok_or_else(|| SheetError::ColumnNotFound(name.to_string()))?;
        let dimensions = self
            .transport
            .get_sheet_dimensions(self.token, self.sheet)
            .await?;

        self.transport
            .batch_structural_update(
                self.token,
                self.sheet,
                vec![StructuralOp::DeleteDimension {
                    sheet_id: dimensions.sheet_id,
                    dimension: Dimension::Columns,
                    start_index: index as u32,
                    end_index: index as u32 + 1,
                }],
            )
            .await?;

        info!(sheet = %self.sheet.sheet_name, column = name, index, "Removed sheet column");
        Ok(())
    }

    /// True if any cell below the header in column `index` is non-blank.
    pub async fn column_has_data(&self, index: usize) -> SheetResult<bool> {
        let rows = self
            .transport
            .read_range(self.token, self.sheet, &a1::column_data_range(index))
            .await?;
        Ok(rows
            .iter()
            .any(|row| row.iter().any(|cell| !cell.trim().is_empty())))
    }

    /// Append one data row; returns its 1-based row number when the response
    /// range can be parsed.
    pub async fn append_row(&self, values: Vec<String>) -> SheetResult<Option<u32>> {
        let result = self
            .transport
            .append_row(self.token, self.sheet, values)
            .await?;
        Ok(crate::record_transform::row_from_updated_range(&result.updated_range))
    }

    /// Overwrite data row `row` with `values`.
    pub async fn write_row(&self, row: u32, values: Vec<String>) -> SheetResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let range = a1::row_range(row, values.len());
        self.transport
            .write_range(self.token, self.sheet, &range, vec![values])
            .await
    }

    /// Delete 1-based sheet row `row`.
    pub async fn delete_row(&self, row: u32) -> SheetResult<()> {
        let dimensions = self
            .transport
            .get_sheet_dimensions(self.token, self.sheet)
            .await?;
        let start = row.saturating_sub(1);
        self.transport
            .batch_structural_update(
                self.token,
                self.sheet,
                vec![StructuralOp::DeleteDimension {
                    sheet_id: dimensions.sheet_id,
                    dimension: Dimension::Rows,
                    start_index: start,
                    end_index: start + 1,
                }],
            )
            .await
    }

    /// Push the local column set out to the header row.
    ///
    /// Local custom columns missing remotely are added, or renamed in place
    /// when an undeclared remote header maps to the same field. Remote headers
    /// that are neither built-in nor declared locally are deleted only when
    /// their column is empty; columns with data are left alone.
    pub async fn sync_column_settings(
        &self,
        kind: &RecordKind,
        columns: &[ColumnDescriptor],
    ) -> SheetResult<ColumnSyncReport> {
        let mut report = ColumnSyncReport::default();
        let declared: Vec<&ColumnDescriptor> = columns.iter().filter(|c| c.is_custom).collect();
        let is_declared = |header: &str| {
            let normalized = normalize_header(header);
            declared.iter().any(|c| c.normalized_header() == normalized)
        };

        let mut headers = self.get_headers().await?;
        for column in &declared {
            if Self::find_header(&headers, &column.header_name).is_some() {
                continue;
            }

            let rename_source = headers
                .iter()
                .find(|h| {
                    !kind.is_builtin_header(h)
                        && !is_declared(h)
                        && generate_field_name(h) == column.field
                })
                .cloned();

            match rename_source {
                Some(old) => {
                    self.rename_column(&old, &column.header_name).await?;
                    report.renamed.push((old, column.header_name.clone()));
                }
                None => {
                    self.add_column(&column.header_name, None).await?;
                    report.added.push(column.header_name.clone());
                }
            }
            headers = self.get_headers().await?;
        }

        let orphans: Vec<String> = headers
            .iter()
            .filter(|h| {
                !normalize_header(h).is_empty() && !kind.is_builtin_header(h) && !is_declared(h)
            })
            .cloned()
            .collect();

        for orphan in orphans {
            let current = self.get_headers().await?;
            let index = match Self::find_header(&current, &orphan) {
                Some(index) => index,
                None => continue,
            };
            if self.column_has_data(index).await? {
                debug!(column = %orphan, "Keeping undeclared column that holds data");
                report.retained.push(orphan);
            } else {
                self.remove_column(&orphan).await?;
                report.removed.push(orphan);
            }
        }

        info!(
            sheet = %self.sheet.sheet_name,
            added = report.added.len(),
            removed = report.removed.len(),
            renamed = report.renamed.len(),
            retained = report.retained.len(),
            "Pushed column settings to sheet"
        );
        Ok(report)
    }
}
