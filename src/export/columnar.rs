use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    path::Path,
    sync::Arc,
};
use tracing::info;

use crate::table::Table;

/// Build an all-Utf8 Arrow batch from `table`, rendering cells as they are exported to CSV.
pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|n| Field::new(n, DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let cols: Vec<ArrayRef> = (0..table.columns.len())
        .map(|i| {
            let arr: StringArray = table
                .rows
                .iter()
                .map(|row| row[i].render().map(|s| s.into_owned()))
                .collect();
            Arc::new(arr) as ArrayRef
        })
        .collect();

    RecordBatch::try_new(schema, cols).context("building record batch")
}

/// Write `table` to a Snappy-compressed Parquet file. Returns the file size in bytes.
#[tracing::instrument(level = "info", skip(table, path), fields(path = %path.as_ref().display(), rows = table.len()))]
pub fn write_parquet<P: AsRef<Path>>(table: &Table, path: P) -> Result<u64> {
    let path = path.as_ref();
    let batch = to_record_batch(table)?;

    let file =
        File::create(path).with_context(|| format!("creating file {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(&batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    let bytes = fs::metadata(path).context("getting file metadata")?.len();
    info!(bytes, "wrote parquet");
    Ok(bytes)
}
