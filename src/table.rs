//! # Raw CSV tables
//!
//! Every stage reads a table, keeps its original columns verbatim, and appends its own
//! columns. [`Table`] stores the header row and the records as [`csv::StringRecord`]s; typed
//! access goes through the column indices resolved by [`crate::schema`].
use camino::Utf8Path;
use csv::StringRecord;

use crate::pipeline_errors::PipelineError;
use crate::schema::column_index;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl Table {
    pub fn new(headers: StringRecord, rows: Vec<StringRecord>) -> Self {
        Table { headers, rows }
    }

    /// Read a CSV file with a header row. Rows may have ragged lengths.
    pub fn read_csv(path: &Utf8Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::MissingResource(path.to_owned()));
        }
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        Self::from_reader(&mut reader)
    }

    pub fn from_reader<R: std::io::Read>(
        reader: &mut csv::Reader<R>,
    ) -> Result<Self, PipelineError> {
        let headers = reader.headers()?.clone();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Table { headers, rows })
    }

    /// Write the table, creating parent directories as needed.
    pub fn write_csv(&self, path: &Utf8Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        column_index(&self.headers, name)
    }

    /// Trimmed cell content, `None` for a missing or empty cell.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Parse a cell as a finite number; null, unparsable and NaN cells yield `None`.
    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        parse_number(self.cell(row, col)?)
    }

    /// Set (or append) a column. Existing columns with the same name are overwritten.
    ///
    /// `values` must hold one entry per row; empty strings encode absent values.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column(name) {
            Some(col) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    let mut cells: Vec<String> = row.iter().map(str::to_string).collect();
                    if cells.len() <= col {
                        cells.resize(col + 1, String::new());
                    }
                    cells[col] = value;
                    *row = StringRecord::from(cells);
                }
            }
            None => {
                let width = self.headers.len();
                self.headers.push_field(name);
                for (row, value) in self.rows.iter_mut().zip(values) {
                    // pad ragged rows so the new cell lands under its header
                    while row.len() < width {
                        row.push_field("");
                    }
                    row.push_field(&value);
                }
            }
        }
    }
}

/// Parse a numeric cell, rejecting NaN and infinities.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format an optional float for output, empty when absent.
pub fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
