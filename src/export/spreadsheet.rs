use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;
use tracing::info;

use crate::error::PipelineError;
use crate::table::{Table, Value};

/// Rows per worksheet in the xlsx format, header included.
pub const MAX_SHEET_ROWS: usize = 1_048_576;
/// Columns per worksheet in the xlsx format.
pub const MAX_SHEET_COLUMNS: usize = 16_384;

/// Write `table` to a single-sheet xlsx workbook with a bold header row.
///
/// Numbers become numeric cells (non-finite values are written as text),
/// text becomes string cells and missing values leave the cell empty.
#[tracing::instrument(level = "info", skip(table, path), fields(path = %path.as_ref().display(), rows = table.len()))]
pub fn write_spreadsheet<P: AsRef<Path>>(table: &Table, path: P) -> Result<()> {
    let path = path.as_ref();
    if table.len() + 1 > MAX_SHEET_ROWS || table.columns.len() > MAX_SHEET_COLUMNS {
        return Err(PipelineError::SpreadsheetTooLarge {
            rows: table.len(),
            columns: table.columns.len(),
        }
        .into());
    }

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1")?;

    for (c, name) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, name, &header)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value {
                Value::Missing => {}
                Value::Number(n) if n.is_finite() => {
                    sheet.write_number(r, c, *n)?;
                }
                Value::Number(n) => {
                    sheet.write_string(r, c, n.to_string())?;
                }
                Value::Text(s) => {
                    sheet.write_string(r, c, s)?;
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("saving workbook {}", path.display()))?;
    info!("wrote spreadsheet");
    Ok(())
}
