//! A1 notation helpers.

/// Last column the gateway reads when it asks for "all" columns.
pub const LAST_COLUMN: &str = "ZZ";

/// 0-based column index -> letters (0 -> "A", 26 -> "AA").
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Letters -> 0-based column index ("A" -> 0, "AA" -> 26).
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let n = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as u8 - b'A') as usize + 1);
    Some(n - 1)
}

/// Header row: `A1:ZZ1`.
pub fn header_range() -> String {
    format!("A1:{}1", LAST_COLUMN)
}

/// Whole grid including the header row: `A1:ZZ`.
pub fn grid_range() -> String {
    format!("A1:{}", LAST_COLUMN)
}

/// Data cells of one column, below the header: `C2:C`.
pub fn column_data_range(index: usize) -> String {
    let letter = column_letter(index);
    format!("{}2:{}", letter, letter)
}

/// One cell of the header row: `C1`.
pub fn header_cell(index: usize) -> String {
    format!("{}1", column_letter(index))
}

/// A full row of `width` cells: `A7:F7`.
pub fn row_range(row: u32, width: usize) -> String {
    format!("A{}:{}{}", row, column_letter(width.max(1) - 1), row)
}

/// One end of an A1 range; either part may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    /// 0-based column
    pub column: Option<usize>,
    /// 1-based row
    pub row: Option<u32>,
}

/// A parsed `start[:end]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct A1Range {
    pub start: CellRef,
    pub end: Option<CellRef>,
}

fn parse_cell(text: &str) -> Option<CellRef> {
    let text = text.trim().replace('$', "");
    let split = text
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(text.len());
    let (letters, digits) = text.split_at(split);

    let column = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse::<u32>().ok().filter(|r| *r > 0)?)
    };

    if column.is_none() && row.is_none() {
        return None;
    }
    Some(CellRef { column, row })
}

/// Parse `A1`, `A1:F1`, `C2:C`, `A:F`, optionally prefixed by `Sheet!`.
pub fn parse_range(range: &str) -> Option<A1Range> {
    let cells = range.rsplit('!').next().unwrap_or(range);
    let mut parts = cells.splitn(2, ':');
    let start = parse_cell(parts.next()?)?;
    let end = match parts.next() {
        Some(end) => Some(parse_cell(end)?),
        None => None,
    };
    Some(A1Range { start, end })
}
