//! In-memory [`SheetsTransport`] for offline demos and tests.
//!
//! Mirrors the backend behaviors the core depends on: reads trim trailing
//! blank cells and rows, writes outside the grid's column count are
//! rejected, and appends grow the grid.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::a1::{self, column_letter};
use super::{
    AccessToken, AppendResult, Dimension, SheetDimensions, SheetRef, SheetsTransport,
    StructuralOp,
};
use crate::error::{SheetError, SheetResult};

/// Minimum reported row count, like a fresh spreadsheet tab.
const DEFAULT_ROW_COUNT: u32 = 1000;

/// Transport operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    Read,
    Write,
    Append,
    Structural,
    Dimensions,
}

#[derive(Debug, Clone)]
struct MemorySheet {
    sheet_id: i64,
    grid: Vec<Vec<String>>,
    column_count: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    sheets: HashMap<String, MemorySheet>,
    offline: bool,
    failing: HashSet<TransportOp>,
    calls: HashMap<TransportOp, usize>,
    next_sheet_id: i64,
}

/// A spreadsheet held in memory, keyed by tab name.
#[derive(Debug, Default)]
pub struct InMemorySheets {
    state: Mutex<MemoryState>,
}

impl InMemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a tab. The grid's widest row sets the column count.
    pub fn with_sheet(self, name: &str, grid: Vec<Vec<String>>) -> Self {
        self.insert_sheet(name, grid);
        self
    }

    pub fn insert_sheet(&self, name: &str, grid: Vec<Vec<String>>) {
        let mut state = self.lock();
        let width = grid.iter().map(Vec::len).max().unwrap_or(0) as u32;
        state.next_sheet_id += 1;
        let sheet_id = state.next_sheet_id;
        state.sheets.insert(
            name.to_string(),
            MemorySheet {
                sheet_id,
                grid,
                column_count: width.max(1),
            },
        );
    }

    /// Current cells of a tab (empty if missing).
    pub fn grid(&self, name: &str) -> Vec<Vec<String>> {
        self.lock()
            .sheets
            .get(name)
            .map(|s| s.grid.clone())
            .unwrap_or_default()
    }

    /// Header row of a tab, trailing blanks trimmed.
    pub fn headers(&self, name: &str) -> Vec<String> {
        let mut headers = self.grid(name).into_iter().next().unwrap_or_default();
        while headers.last().map(|h| h.is_empty()).unwrap_or(false) {
            headers.pop();
        }
        headers
    }

    /// Overwrite one cell (1-based row, 0-based column), growing the grid as
    /// a collaborator editing the sheet directly would.
    pub fn set_cell(&self, name: &str, row: u32, column: usize, value: &str) {
        let mut state = self.lock();
        if let Some(sheet) = state.sheets.get_mut(name) {
            put_cell(&mut sheet.grid, row as usize - 1, column, value.to_string());
            sheet.column_count = sheet.column_count.max(column as u32 + 1);
        }
    }

    /// Make every call fail with `RemoteUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make one kind of call fail until cleared.
    pub fn fail_on(&self, op: TransportOp, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    pub fn call_count(&self, op: TransportOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call, apply failure injection and return the locked state.
    fn begin(&self, op: TransportOp, token: &AccessToken) -> SheetResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        if state.offline || state.failing.contains(&op) {
            return Err(SheetError::remote(op_name(op), "connection refused"));
        }
        if token.is_empty() {
            return Err(SheetError::remote(op_name(op), "401 unauthorized"));
        }
        Ok(state)
    }
}

fn op_name(op: TransportOp) -> &'static str {
    match op {
        TransportOp::Read => "read range",
        TransportOp::Write => "write range",
        TransportOp::Append => "append row",
        TransportOp::Structural => "structural update",
        TransportOp::Dimensions => "get dimensions",
    }
}

fn sheet_mut<'s>(state: &'s mut MemoryState, sheet: &SheetRef) -> SheetResult<&'s mut MemorySheet> {
    state
        .sheets
        .get_mut(&sheet.sheet_name)
        .ok_or_else(|| SheetError::SheetNotFound(sheet.sheet_name.clone()))
}

fn put_cell(grid: &mut Vec<Vec<String>>, row: usize, column: usize, value: String) {
    if grid.len() <= row {
        grid.resize(row + 1, Vec::new());
    }
    let cells = &mut grid[row];
    if cells.len() <= column {
        cells.resize(column + 1, String::new());
    }
    cells[column] = value;
}

fn trim_trailing_blanks(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    for row in rows.iter_mut() {
        while row.last().map(|c| c.is_empty()).unwrap_or(false) {
            row.pop();
        }
    }
    while rows.last().map(|r| r.is_empty()).unwrap_or(false) {
        rows.pop();
    }
    rows
}

fn bad_range(range: &str) -> SheetError {
    SheetError::remote("parse range", format!("unable to parse range: {}", range))
}

#[async_trait]
impl SheetsTransport for InMemorySheets {
    async fn read_range(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        range: &str,
    ) -> SheetResult<Vec<Vec<String>>> {
        let mut state = self.begin(TransportOp::Read, token)?;
        let tab = sheet_mut(&mut state, sheet)?;
        let parsed = a1::parse_range(range).ok_or_else(|| bad_range(range))?;

        let first_row = parsed.start.row.unwrap_or(1) as usize - 1;
        let first_col = parsed.start.column.unwrap_or(0);
        let end = parsed.end.unwrap_or(parsed.start);
        let last_row = end.row.map(|r| r as usize - 1);
        let last_col = end.column;

        let rows: Vec<Vec<String>> = tab
            .grid
            .iter()
            .enumerate()
            .filter(|(i, _)| *i >= first_row && last_row.map(|l| *i <= l).unwrap_or(true))
            .map(|(_, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(j, _)| *j >= first_col && last_col.map(|l| *j <= l).unwrap_or(true))
                    .map(|(_, cell)| cell.clone())
                    .collect()
            })
            .collect();

        Ok(trim_trailing_blanks(rows))
    }

    async fn write_range(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> SheetResult<()> {
        let mut state = self.begin(TransportOp::Write, token)?;
        let tab = sheet_mut(&mut state, sheet)?;
        let parsed = a1::parse_range(range).ok_or_else(|| bad_range(range))?;

        let first_row = parsed.start.row.unwrap_or(1) as usize - 1;
        let first_col = parsed.start.column.unwrap_or(0);
        let widest = values.iter().map(Vec::len).max().unwrap_or(0);
        if first_col + widest > tab.column_count as usize {
            return Err(SheetError::remote(
                "write range",
                format!(
                    "range {} exceeds grid limits (max column {})",
                    range,
                    column_letter(tab.column_count.saturating_sub(1) as usize)
                ),
            ));
        }

        for (i, row) in values.into_iter().enumerate() {
            for (j, value) in row.into_iter().enumerate() {
                put_cell(&mut tab.grid, first_row + i, first_col + j, value);
            }
        }
        Ok(())
    }

    async fn append_row(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        values: Vec<String>,
    ) -> SheetResult<AppendResult> {
        let mut state = self.begin(TransportOp::Append, token)?;
        let tab = sheet_mut(&mut state, sheet)?;

        let last_used = tab
            .grid
            .iter()
            .rposition(|row| row.iter().any(|c| !c.trim().is_empty()))
            .map(|i| i + 1)
            .unwrap_or(0);
        let width = values.len();
        tab.grid.truncate(last_used);
        tab.grid.push(values);
        tab.column_count = tab.column_count.max(width as u32);

        let row = tab.grid.len() as u32;
        Ok(AppendResult {
            updated_range: format!("{}!{}", sheet.sheet_name, a1::row_range(row, width)),
        })
    }

    async fn batch_structural_update(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
        requests: Vec<StructuralOp>,
    ) -> SheetResult<()> {
        let mut state = self.begin(TransportOp::Structural, token)?;
        let tab = sheet_mut(&mut state, sheet)?;

        for request in requests {
            match request {
                StructuralOp::InsertDimension {
                    sheet_id,
                    dimension,
                    start_index,
                    end_index,
                } => {
                    check_sheet_id(tab, sheet_id)?;
                    let start = start_index as usize;
                    let count = end_index.saturating_sub(start_index) as usize;
                    match dimension {
                        Dimension::Columns => {
                            for row in tab.grid.iter_mut() {
                                if row.len() > start {
                                    for _ in 0..count {
                                        row.insert(start, String::new());
                                    }
                                }
                            }
                            tab.column_count += count as u32;
                        }
                        Dimension::Rows => {
                            if tab.grid.len() > start {
                                for _ in 0..count {
                                    tab.grid.insert(start, Vec::new());
                                }
                            }
                        }
                    }
                }
                StructuralOp::DeleteDimension {
                    sheet_id,
                    dimension,
                    start_index,
                    end_index,
                } => {
                    check_sheet_id(tab, sheet_id)?;
                    let start = start_index as usize;
                    let end = end_index as usize;
                    match dimension {
                        Dimension::Columns => {
                            for row in tab.grid.iter_mut() {
                                let to = end.min(row.len());
                                if start < to {
                                    row.drain(start..to);
                                }
                            }
                            tab.column_count = tab
                                .column_count
                                .saturating_sub(end_index.saturating_sub(start_index))
                                .max(1);
                        }
                        Dimension::Rows => {
                            let to = end.min(tab.grid.len());
                            if start < to {
                                tab.grid.drain(start..to);
                            }
                        }
                    }
                }
                StructuralOp::AutoResizeDimensions { sheet_id, .. } => {
                    check_sheet_id(tab, sheet_id)?;
                }
            }
        }
        Ok(())
    }

    async fn get_sheet_dimensions(
        &self,
        token: &AccessToken,
        sheet: &SheetRef,
    ) -> SheetResult<SheetDimensions> {
        let mut state = self.begin(TransportOp::Dimensions, token)?;
        let tab = sheet_mut(&mut state, sheet)?;
        Ok(SheetDimensions {
            sheet_id: tab.sheet_id,
            row_count: (tab.grid.len() as u32).max(DEFAULT_ROW_COUNT),
            column_count: tab.column_count,
        })
    }
}

fn check_sheet_id(tab: &MemorySheet, sheet_id: i64) -> SheetResult<()> {
    if tab.sheet_id == sheet_id {
        Ok(())
    } else {
        Err(SheetError::SheetNotFound(format!("sheet id {}", sheet_id)))
    }
}
