//! In-memory tables and CSV round-tripping.
//!
//! Downloaded analysis outputs are parsed into [`Table`] values, combined,
//! and written back out with the `csv` crate. Rows are kept as plain strings;
//! nothing here interprets cell contents.

use anyhow::{Context, Result};
use std::path::Path;

/// A row-oriented table with named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Column names from the header row.
    pub headers: Vec<String>,
    /// Data rows, one `Vec` of cells per row.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Parse a CSV file into a table.
    ///
    /// Ragged rows are accepted as-is; column alignment is the producer's
    /// responsibility.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
            .iter()
            .map(String::from)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record
                .with_context(|| format!("Failed to read CSV record: {}", path.display()))?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Write the table as UTF-8 CSV with a header row and no index column.
    pub fn write_csv_path(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

        writer
            .write_record(&self.headers)
            .with_context(|| format!("Failed to write CSV header: {}", path.display()))?;

        for row in &self.rows {
            writer
                .write_record(row)
                .with_context(|| format!("Failed to write CSV row: {}", path.display()))?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to flush CSV file: {}", path.display()))?;

        Ok(())
    }

    /// Append another table's rows, keeping this table's headers.
    pub fn extend_rows(&mut self, other: &Table) {
        self.rows.extend(other.rows.iter().cloned());
    }

    /// Set a cell in the given row, ignoring out-of-range columns.
    pub fn set_cell(&mut self, row: usize, column: usize, value: &str) {
        if let Some(cells) = self.rows.get_mut(row) {
            if let Some(cell) = cells.get_mut(column) {
                *cell = value.to_string();
            }
        }
    }
}
