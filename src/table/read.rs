use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::{fs, io::Cursor, path::Path};
use tracing::{info, warn};

use super::RawTable;

const UTF8_BOM: &str = "\u{feff}";

/// Text encodings the registry exports come in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// ISO-8859-1: every byte is the code point of the same value.
    Latin1,
    /// UTF-8; a leading byte-order mark is ignored on read.
    Utf8,
    /// UTF-8 with a byte-order mark. Only differs from `Utf8` when writing.
    Utf8Bom,
}

impl Encoding {
    pub fn decode(self, bytes: Vec<u8>) -> Result<String> {
        match self {
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Encoding::Utf8 | Encoding::Utf8Bom => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    anyhow!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to())
                })?;
                Ok(match text.strip_prefix(UTF8_BOM) {
                    Some(rest) => rest.to_string(),
                    None => text,
                })
            }
        }
    }
}

/// Parse a delimited text file into string cells.
///
/// The first line is the header. Quoting follows the usual `"` rules. Rows keep
/// however many fields they had; `Table::from_raw` pads short ones and rejects
/// long ones.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_delimited_table<P: AsRef<Path>>(
    path: P,
    delimiter: u8,
    encoding: Encoding,
) -> Result<RawTable> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = encoding
        .decode(bytes)
        .with_context(|| format!("Failed to decode {} as {:?}", path.display(), encoding))?;

    let raw = parse_delimited(&text, delimiter)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    info!(rows = raw.len(), columns = raw.headers.len(), "loaded table");
    Ok(raw)
}

/// Parse already-decoded delimited text.
pub fn parse_delimited(text: &str, delimiter: u8) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(Cursor::new(text.as_bytes()));

    let headers: Vec<String> = rdr
        .headers()
        .context("reading header line")?
        .iter()
        .map(|s| s.to_string())
        .collect();
    if headers.is_empty() {
        warn!("delimited input has no header line");
    }

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("parse error at record {}", idx))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(RawTable::new(headers, rows))
}
