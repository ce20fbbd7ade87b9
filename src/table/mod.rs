// src/table/mod.rs
pub mod raw_table;
pub mod read;
pub mod utils;

use std::{borrow::Cow, collections::HashMap};

use anyhow::Result;
use tracing::{debug, warn};

use crate::error::PipelineError;
pub use raw_table::RawTable;
pub use read::{load_delimited_table, Encoding};
use utils::{format_number, normalize_header, parse_number};

/// A single typed cell. Numeric columns hold `Number` or `Missing`, never raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
}

impl Value {
    /// Empty cells load as `Missing`; everything else stays text until coerced.
    pub fn from_cell(cell: &str) -> Self {
        if cell.is_empty() {
            Value::Missing
        } else {
            Value::Text(cell.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used for export and text comparisons; `None` when missing.
    pub fn render(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Missing => None,
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
            Value::Text(s) => Some(Cow::Borrowed(s)),
        }
    }

    /// Coerce to numeric: numbers stay, text is parsed, anything unparseable is missing.
    pub fn to_numeric(&self) -> Value {
        match self {
            Value::Number(n) => Value::Number(*n),
            Value::Text(s) => parse_number(s).map_or(Value::Missing, Value::Number),
            Value::Missing => Value::Missing,
        }
    }
}

/// In-memory table with typed cells. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Human label used in logs and errors (e.g. "registry").
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    index: HashMap<String, usize>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let index = build_index(&columns);
        Self {
            name: name.into(),
            columns,
            rows,
            index,
        }
    }

    /// Build a typed table from raw string cells, normalizing header names.
    ///
    /// Short rows are padded with `Missing`. A row with more fields than the
    /// header is a `RaggedRow` error naming the table and record index.
    pub fn from_raw(name: impl Into<String>, raw: RawTable) -> Result<Self> {
        let name = name.into();
        if raw.is_empty() {
            warn!(table = %name, "no data rows");
        }
        let columns: Vec<String> = raw.headers.iter().map(|h| normalize_header(h)).collect();
        let width = columns.len();
        let record_count = raw.len();

        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(record_count);
        for (record, row) in raw.rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(PipelineError::RaggedRow {
                    table: name,
                    record,
                    fields: row.len(),
                    expected: width,
                }
                .into());
            }
            let mut cells: Vec<Value> = row.iter().map(|c| Value::from_cell(c)).collect();
            cells.resize(width, Value::Missing);
            rows.push(cells);
        }

        debug!(table = %name, columns = width, rows = record_count, "built table");
        Ok(Table::new(name, columns, rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Like `column_index`, but a missing column is a schema error.
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| PipelineError::missing_column(&self.name, column).into())
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Coerce each named column to numeric in place. Absent columns are skipped with a warning.
    pub fn coerce_numeric(&mut self, columns: &[&str]) {
        for &column in columns {
            let Some(idx) = self.column_index(column) else {
                warn!(table = %self.name, column, "numeric column not present, skipping coercion");
                continue;
            };
            let mut unparsed = 0usize;
            for row in &mut self.rows {
                let coerced = row[idx].to_numeric();
                if coerced.is_missing() && !row[idx].is_missing() {
                    unparsed += 1;
                }
                row[idx] = coerced;
            }
            if unparsed > 0 {
                debug!(table = %self.name, column, unparsed, "unparseable numeric cells set to missing");
            }
        }
    }

    /// Append a derived column. `values` must have one entry per row.
    pub fn push_column(&mut self, column: impl Into<String>, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        let column = column.into();
        self.index.insert(column.clone(), self.columns.len());
        self.columns.push(column);
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.push(v);
        }
    }
}

fn build_index(columns: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(columns.len());
    for (i, c) in columns.iter().enumerate() {
        // first occurrence wins for lookups
        index.entry(c.clone()).or_insert(i);
    }
    index
}
