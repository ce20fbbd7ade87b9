use thiserror::Error;

/// Errors the pipeline boundary needs to tell apart from plain I/O failures.
///
/// Everything else travels as `anyhow::Error`; these are recovered with
/// `err.downcast_ref::<PipelineError>()`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The user dismissed a file or folder prompt.
    #[error("no selection made for {what}")]
    Aborted { what: String },
    #[error("column `{column}` not found in {table}")]
    MissingColumn { table: String, column: String },
    /// A data row has more fields than the header, usually an unquoted delimiter
    /// inside a field. Every later field would be shifted, so the load fails.
    #[error("{table}: record {record} has {fields} fields, header has {expected}")]
    RaggedRow {
        table: String,
        record: usize,
        fields: usize,
        expected: usize,
    },
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("{rows} rows × {columns} columns exceed the worksheet limits")]
    SpreadsheetTooLarge { rows: usize, columns: usize },
}

impl PipelineError {
    pub fn aborted(what: impl Into<String>) -> Self {
        PipelineError::Aborted { what: what.into() }
    }

    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, PipelineError::Aborted { .. })
    }
}
