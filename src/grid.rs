//! The tab-delimited result grid exchanged between query executors and the
//! result merger:
//!
//! ```text
//! CustomerID\tName
//! 1\tAlice
//! 2\tBob
//! Rows extracted: 2
//! ```

use std::collections::HashMap;

pub const ROW_COUNT_PREFIX: &str = "Rows extracted:";

/// Writes a grid from column names and already formatted cells.
pub fn write_grid(columns: &[String], rows: &[Vec<String>]) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(columns.iter().map(|c| sanitize_cell(c)))?;
    for row in rows {
        writer.write_record(row.iter().map(|v| sanitize_cell(v)))?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let mut grid = String::from_utf8_lossy(&bytes).into_owned();
    grid.push_str(&format!("{} {}", ROW_COUNT_PREFIX, rows.len()));
    Ok(grid)
}

/// Tabs and line breaks inside a cell would break the grid shape.
fn sanitize_cell(value: &str) -> String {
    value.replace(['\t', '\r', '\n'], " ")
}

/// Reads the `Rows extracted: N` trailer, falling back to counting data lines.
pub fn row_count(grid: &str) -> usize {
    for line in grid.lines().rev() {
        if let Some(rest) = line.trim().strip_prefix(ROW_COUNT_PREFIX) {
            if let Ok(n) = rest.trim().parse() {
                return n;
            }
        }
    }
    parse_rows(grid).map(|(_, rows)| rows.len()).unwrap_or(0)
}

/// One branch's grid split into columns and rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGrid {
    pub database_id: String,
    pub database_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl ParsedGrid {
    /// Returns `None` when the text has no recognisable header.
    pub fn parse(database_id: &str, database_name: &str, grid: &str) -> Option<Self> {
        let (columns, rows) = parse_rows(grid)?;
        let rows = rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect();

        Some(Self {
            database_id: database_id.to_string(),
            database_name: database_name.to_string(),
            columns,
            rows,
        })
    }

    /// Case-insensitive column lookup returning the grid's own casing.
    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn is_trailer(line: &str) -> bool {
    line.trim_start().starts_with(ROW_COUNT_PREFIX)
}

fn parse_rows(grid: &str) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let lines: Vec<&str> = grid.lines().collect();

    // Header is the first line with a tab; single-column grids have none,
    // so fall back to the first non-blank line that is not the trailer.
    let header_idx = lines
        .iter()
        .position(|l| l.contains('\t'))
        .or_else(|| lines.iter().position(|l| !l.trim().is_empty() && !is_trailer(l)))?;

    let columns: Vec<String> = lines[header_idx]
        .split('\t')
        .map(|c| c.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for line in &lines[header_idx + 1..] {
        if is_trailer(line) {
            break;
        }
        let values: Vec<String> = line.split('\t').map(|v| v.trim().to_string()).collect();
        if values.len() != columns.len() {
            break;
        }
        rows.push(values);
    }

    Some((columns, rows))
}
