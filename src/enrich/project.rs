use std::collections::HashSet;

use tracing::debug;

use crate::table::Table;

/// Resolve the output column order.
///
/// `required` comes first in its declared order, followed by every column of
/// each `extra_sources` list that has not appeared yet (first occurrence
/// wins). The result is then restricted to `present`, keeping relative order;
/// columns that do not exist are dropped silently.
pub fn resolve_columns(
    required: &[String],
    extra_sources: &[Vec<String>],
    present: &[String],
) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut wanted: Vec<&str> = Vec::with_capacity(required.len());
    for col in required.iter().chain(extra_sources.iter().flatten()) {
        if seen.insert(col.as_str()) {
            wanted.push(col.as_str());
        }
    }

    let available: HashSet<&str> = present.iter().map(String::as_str).collect();
    let (kept, dropped): (Vec<&str>, Vec<&str>) =
        wanted.into_iter().partition(|c| available.contains(c));
    if !dropped.is_empty() {
        debug!(?dropped, "columns not present, omitted from output");
    }
    kept.into_iter().map(str::to_string).collect()
}

/// Select and reorder columns of `table`. Cell values are not touched.
#[tracing::instrument(level = "info", skip_all, fields(table = %table.name))]
pub fn project(table: Table, required: &[String], extra_sources: &[Vec<String>]) -> Table {
    let columns = resolve_columns(required, extra_sources, &table.columns);
    let indices: Vec<usize> = columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    let Table { name, rows, .. } = table;
    let rows = rows
        .into_iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();

    debug!(columns = columns.len(), "projected");
    Table::new(name, columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn required_first_then_extras_deduplicated() {
        let out = resolve_columns(
            &cols(&["MATRICULA", "TAMANO_EMPRESA"]),
            &[cols(&["CIIU_INT", "RAMA", "MATRICULA"]), cols(&["MPIO_CDPMP", "RAMA", "PROVINCIA"])],
            &cols(&["PROVINCIA", "RAMA", "MATRICULA", "TAMANO_EMPRESA", "CIIU_INT", "MPIO_CDPMP"]),
        );
        assert_eq!(
            out,
            cols(&["MATRICULA", "TAMANO_EMPRESA", "CIIU_INT", "RAMA", "MPIO_CDPMP", "PROVINCIA"])
        );
    }

    #[test]
    fn absent_columns_are_dropped_silently() {
        let out = resolve_columns(
            &cols(&["MATRICULA", "EMPLEADOS", "TAMANO_EMPRESA"]),
            &[cols(&["GONE"])],
            &cols(&["TAMANO_EMPRESA", "MATRICULA", "OTHER"]),
        );
        assert_eq!(out, cols(&["MATRICULA", "TAMANO_EMPRESA"]));
    }

    #[test]
    fn project_reorders_without_touching_values() {
        let table = Table::new(
            "t",
            cols(&["B", "A", "C"]),
            vec![vec![
                Value::Number(2.0),
                Value::Text("a".into()),
                Value::Missing,
            ]],
        );
        let out = project(table, &cols(&["A", "B", "A"]), &[cols(&["C", "Z"])]);
        assert_eq!(out.columns, cols(&["A", "B", "C"]));
        assert_eq!(
            out.rows[0],
            vec![Value::Text("a".into()), Value::Number(2.0), Value::Missing]
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let required = cols(&["X", "Y"]);
        let extras = vec![cols(&["Q", "P", "X"])];
        let present = cols(&["P", "Q", "Y", "X"]);
        let first = resolve_columns(&required, &extras, &present);
        for _ in 0..10 {
            assert_eq!(resolve_columns(&required, &extras, &present), first);
        }
    }
}
