use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::table::Table;

/// Keep rows whose `field` is exactly one of `allowed`.
///
/// Comparison is case- and accent-sensitive. Missing values never match. If the
/// column does not exist at all, no row can match and the result is empty.
#[tracing::instrument(level = "info", skip(table, allowed), fields(table = %table.name))]
pub fn retain_in(table: Table, field: &str, allowed: &BTreeSet<String>) -> Table {
    let Some(idx) = table.column_index(field) else {
        warn!(field, "filter column absent, no rows retained");
        return Table::new(table.name, table.columns, Vec::new());
    };

    let before = table.len();
    let Table {
        name, columns, rows, ..
    } = table;
    let rows: Vec<_> = rows
        .into_iter()
        .filter(|row| {
            row[idx]
                .render()
                .is_some_and(|v| allowed.contains(v.as_ref()))
        })
        .collect();

    info!(before, after = rows.len(), "filtered");
    Table::new(name, columns, rows)
}
