use anyhow::{anyhow, Context, Result};
use csv::{Terminator, WriterBuilder};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::info;

use crate::table::{Encoding, Table};

/// Write `table` as delimited text: one header line, then one line per row.
/// Missing cells are written as empty fields.
#[tracing::instrument(level = "info", skip(table, path), fields(path = %path.as_ref().display(), rows = table.len()))]
pub fn write_delimited_table<P: AsRef<Path>>(
    table: &Table,
    path: P,
    delimiter: u8,
    encoding: Encoding,
) -> Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("creating file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write_delimited_to(&mut out, table, delimiter, encoding)
        .with_context(|| format!("writing {}", path.display()))?;
    out.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    info!("wrote delimited table");
    Ok(())
}

/// Same as `write_delimited_table`, into any writer.
pub fn write_delimited_to<W: Write>(
    out: &mut W,
    table: &Table,
    delimiter: u8,
    encoding: Encoding,
) -> Result<()> {
    if encoding == Encoding::Utf8Bom {
        out.write_all("\u{feff}".as_bytes())?;
    }

    let mut buf = Vec::new();
    {
        let mut wtr = WriterBuilder::new()
            .delimiter(delimiter)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(&mut buf);
        wtr.write_record(&table.columns)
            .context("writing header")?;
        for row in &table.rows {
            wtr.write_record(row.iter().map(|v| v.render().unwrap_or_default().into_owned()))
                .context("writing row")?;
        }
        wtr.flush()?;
    }

    match encoding {
        Encoding::Utf8 | Encoding::Utf8Bom => out.write_all(&buf)?,
        Encoding::Latin1 => {
            let text = String::from_utf8(buf)?;
            let bytes = text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c))
                        .map_err(|_| anyhow!("character {:?} has no Latin-1 encoding", c))
                })
                .collect::<Result<Vec<u8>>>()?;
            out.write_all(&bytes)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> Table {
        Table::new(
            "out",
            vec!["MATRICULA".into(), "RAZON_SOCIAL".into(), "INGRESOS".into()],
            vec![
                vec![
                    Value::Text("0001".into()),
                    Value::Text("PANADERÍA; LA ESPIGA".into()),
                    Value::Number(50_000_000_000.0),
                ],
                vec![Value::Text("0002".into()), Value::Missing, Value::Number(12.5)],
            ],
        )
    }

    #[test]
    fn writes_semicolon_utf8_with_bom() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.csv");
        write_delimited_table(&sample(), &path, b';', Encoding::Utf8Bom)?;

        let bytes = fs::read(&path)?;
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        let text = String::from_utf8(bytes[3..].to_vec())?;
        assert_eq!(
            text,
            "MATRICULA;RAZON_SOCIAL;INGRESOS\n0001;\"PANADERÍA; LA ESPIGA\";50000000000\n0002;;12.5\n"
        );
        Ok(())
    }

    #[test]
    fn latin1_output_encodes_single_bytes() -> Result<()> {
        let mut buf = Vec::new();
        let t = Table::new("t", vec!["N".into()], vec![vec![Value::Text("Ñ".into())]]);
        write_delimited_to(&mut buf, &t, b'|', Encoding::Latin1)?;
        assert_eq!(buf, b"N\n\xd1\n");
        Ok(())
    }

    #[test]
    fn latin1_output_rejects_unencodable_text() {
        let mut buf = Vec::new();
        let t = Table::new("t", vec!["N".into()], vec![vec![Value::Text("€".into())]]);
        assert!(write_delimited_to(&mut buf, &t, b'|', Encoding::Latin1).is_err());
    }

    #[test]
    fn unwritable_path_is_an_error() {
        assert!(write_delimited_table(&sample(), "/no/such/dir/out.csv", b';', Encoding::Utf8).is_err());
    }
}
