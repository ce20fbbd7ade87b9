use std::collections::HashMap;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::table::{Table, Value};

/// Suffix given to a reference column whose name is already taken by the primary table.
pub const COLLISION_SUFFIX: &str = "_REF";

/// How both key columns are coerced before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Parsed as numbers; `4711`, `4711.0` and ` 4711 ` are the same key.
    Numeric,
    /// Compared as exact strings.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Number(u64),
    Text(String),
}

impl KeyKind {
    fn key(self, value: &Value) -> Option<JoinKey> {
        match self {
            KeyKind::Numeric => value.to_numeric().as_number().map(|n| {
                // -0.0 and 0.0 must hash alike
                let n = if n == 0.0 { 0.0 } else { n };
                JoinKey::Number(n.to_bits())
            }),
            KeyKind::Text => value.render().map(|s| JoinKey::Text(s.into_owned())),
        }
    }
}

/// Left outer equality join of `primary` against `reference`.
///
/// Every primary row appears at least once, in its original order. A row whose
/// key is missing or does not parse under `kind` matches nothing and gets
/// `Missing` for every reference column. Duplicate reference keys fan out, one
/// output row per match in reference order.
///
/// Output columns are the primary columns followed by the reference columns.
/// The reference key is dropped when it has the same name as the primary key;
/// any other reference column whose name is taken gets `COLLISION_SUFFIX`,
/// repeated until the name is free.
#[tracing::instrument(
    level = "info",
    skip(primary, reference),
    fields(primary = %primary.name, reference = %reference.name)
)]
pub fn left_join(
    primary: &Table,
    reference: &Table,
    primary_key: &str,
    reference_key: &str,
    kind: KeyKind,
) -> Result<Table> {
    let pk_idx = primary.require_column(primary_key)?;
    let rk_idx = reference.require_column(reference_key)?;

    // 1) Pick the reference columns to carry over, renaming collisions
    let drop_ref_key = primary_key == reference_key;
    let mut columns = primary.columns.clone();
    let mut carried: Vec<usize> = Vec::with_capacity(reference.columns.len());
    for (i, name) in reference.columns.iter().enumerate() {
        if drop_ref_key && i == rk_idx {
            continue;
        }
        let out_name = if columns.contains(name) {
            let mut renamed = format!("{}{}", name, COLLISION_SUFFIX);
            while columns.contains(&renamed) {
                renamed.push_str(COLLISION_SUFFIX);
            }
            warn!(column = %name, renamed = %renamed, "reference column collides with primary column");
            renamed
        } else {
            name.clone()
        };
        columns.push(out_name);
        carried.push(i);
    }

    // 2) Index reference rows by normalized key, keeping source order per key
    let mut lookup: HashMap<JoinKey, Vec<usize>> = HashMap::with_capacity(reference.len());
    let mut unkeyed = 0usize;
    for (i, row) in reference.rows.iter().enumerate() {
        match kind.key(&row[rk_idx]) {
            Some(k) => lookup.entry(k).or_default().push(i),
            None => unkeyed += 1,
        }
    }
    let duplicated = lookup.values().filter(|rows| rows.len() > 1).count();
    if duplicated > 0 {
        warn!(duplicated, key = reference_key, "reference keys are not unique, matches will fan out");
    }
    if unkeyed > 0 {
        debug!(unkeyed, "reference rows without a usable key are unreachable");
    }

    // 3) Probe in primary order
    let mut rows = Vec::with_capacity(primary.len());
    let mut unmatched = 0usize;
    for row in &primary.rows {
        let matches = kind.key(&row[pk_idx]).and_then(|k| lookup.get(&k));
        match matches {
            Some(ref_rows) => {
                for &r in ref_rows {
                    let mut out = Vec::with_capacity(columns.len());
                    out.extend(row.iter().cloned());
                    out.extend(carried.iter().map(|&c| reference.rows[r][c].clone()));
                    rows.push(out);
                }
            }
            None => {
                unmatched += 1;
                let mut out = Vec::with_capacity(columns.len());
                out.extend(row.iter().cloned());
                out.resize(columns.len(), Value::Missing);
                rows.push(out);
            }
        }
    }

    info!(
        in_rows = primary.len(),
        out_rows = rows.len(),
        unmatched,
        "joined"
    );
    Ok(Table::new(primary.name.clone(), columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::table::RawTable;

    fn table(name: &str, headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_raw(
            name,
            RawTable::new(
                headers.iter().map(|s| s.to_string()).collect(),
                rows.iter()
                    .map(|r| r.iter().map(|s| s.to_string()).collect())
                    .collect(),
            ),
        )
        .expect("fixture rows fit the header")
    }

    fn sectors() -> Table {
        let mut t = table(
            "sectors",
            &["CIIU_INT", "RAMA", "PIB"],
            &[&["4711", "Comercio", "G"], &["1011", "Industria", "C"], &["x", "Servicio", "?"]],
        );
        t.coerce_numeric(&["CIIU_INT"]);
        t
    }

    fn registry() -> Table {
        let mut t = table(
            "registry",
            &["MATRICULA", "COD_CIIU"],
            &[&["1", "4711"], &["2", "abc"], &["3", ""], &["4", "1011.0"], &["5", "9999"]],
        );
        t.coerce_numeric(&["COD_CIIU"]);
        t
    }

    #[test]
    fn left_join_keeps_every_primary_row_in_order() -> Result<()> {
        let joined = left_join(&registry(), &sectors(), "COD_CIIU", "CIIU_INT", KeyKind::Numeric)?;
        assert_eq!(
            joined.columns,
            vec!["MATRICULA", "COD_CIIU", "CIIU_INT", "RAMA", "PIB"]
        );
        assert_eq!(joined.len(), 5);
        let ids: Vec<_> = (0..5).map(|i| joined.get(i, "MATRICULA").cloned()).collect();
        assert_eq!(
            ids,
            ["1", "2", "3", "4", "5"]
                .iter()
                .map(|s| Some(Value::Text(s.to_string())))
                .collect::<Vec<_>>()
        );
        assert_eq!(joined.get(0, "RAMA"), Some(&Value::Text("Comercio".into())));
        assert_eq!(joined.get(3, "RAMA"), Some(&Value::Text("Industria".into())));
        Ok(())
    }

    #[test]
    fn unparseable_key_appears_once_with_missing_reference_fields() -> Result<()> {
        let joined = left_join(&registry(), &sectors(), "COD_CIIU", "CIIU_INT", KeyKind::Numeric)?;
        for row in [1, 2, 4] {
            for col in ["CIIU_INT", "RAMA", "PIB"] {
                assert_eq!(joined.get(row, col), Some(&Value::Missing), "row {row} col {col}");
            }
        }
        // the reference row keyed "x" is never reachable, even from an unparsed primary key
        assert!(joined
            .rows
            .iter()
            .all(|r| r[3] != Value::Text("Servicio".into())));
        Ok(())
    }

    #[test]
    fn duplicate_reference_keys_fan_out_in_reference_order() -> Result<()> {
        let geo = table(
            "geo",
            &["MPIO_CDPMP", "PROVINCIA"],
            &[&["11001", "A"], &["25001", "B"], &["11001", "C"]],
        );
        let primary = table("registry", &["MUNICIPIO", "ID"], &[&["11001", "1"], &["25001", "2"]]);

        let joined = left_join(&primary, &geo, "MUNICIPIO", "MPIO_CDPMP", KeyKind::Text)?;
        assert_eq!(joined.len(), 3);
        let provs: Vec<_> = joined.rows.iter().map(|r| r[3].clone()).collect();
        assert_eq!(
            provs,
            vec![
                Value::Text("A".into()),
                Value::Text("C".into()),
                Value::Text("B".into())
            ]
        );
        Ok(())
    }

    #[test]
    fn text_keys_match_exactly() -> Result<()> {
        let geo = table("geo", &["MPIO_CDPMP", "DPTO"], &[&["11001", "BOGOTA"]]);
        let primary = table("registry", &["MUNICIPIO"], &[&["011001"], &["11001 "], &["11001"]]);
        let joined = left_join(&primary, &geo, "MUNICIPIO", "MPIO_CDPMP", KeyKind::Text)?;
        assert_eq!(joined.get(0, "DPTO"), Some(&Value::Missing));
        assert_eq!(joined.get(1, "DPTO"), Some(&Value::Missing));
        assert_eq!(joined.get(2, "DPTO"), Some(&Value::Text("BOGOTA".into())));
        Ok(())
    }

    #[test]
    fn shared_key_name_is_not_duplicated_and_collisions_are_renamed() -> Result<()> {
        let reference = table("ref", &["CODE", "NAME"], &[&["1", "ref-name"]]);
        let primary = table("registry", &["CODE", "NAME"], &[&["1", "own-name"]]);
        let joined = left_join(&primary, &reference, "CODE", "CODE", KeyKind::Text)?;
        assert_eq!(joined.columns, vec!["CODE", "NAME", "NAME_REF"]);
        assert_eq!(joined.get(0, "NAME"), Some(&Value::Text("own-name".into())));
        assert_eq!(joined.get(0, "NAME_REF"), Some(&Value::Text("ref-name".into())));
        Ok(())
    }

    #[test]
    fn renamed_collision_skips_names_already_taken() -> Result<()> {
        let reference = table("ref", &["K2", "NAME"], &[&["1", "ref-name"]]);
        let primary = table("registry", &["K", "NAME", "NAME_REF"], &[&["1", "own", "own-ref"]]);
        let joined = left_join(&primary, &reference, "K", "K2", KeyKind::Text)?;
        assert_eq!(joined.columns, vec!["K", "NAME", "NAME_REF", "K2", "NAME_REF_REF"]);
        assert_eq!(joined.get(0, "NAME_REF"), Some(&Value::Text("own-ref".into())));
        assert_eq!(joined.get(0, "NAME_REF_REF"), Some(&Value::Text("ref-name".into())));
        Ok(())
    }

    #[test]
    fn negative_zero_key_matches_zero() -> Result<()> {
        let reference = table("ref", &["CIIU_INT", "RAMA"], &[&["0", "Servicio"]]);
        let primary = table("registry", &["COD_CIIU"], &[&["-0"], &["0.0"]]);
        let joined = left_join(&primary, &reference, "COD_CIIU", "CIIU_INT", KeyKind::Numeric)?;
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.get(0, "RAMA"), Some(&Value::Text("Servicio".into())));
        assert_eq!(joined.get(1, "RAMA"), Some(&Value::Text("Servicio".into())));
        Ok(())
    }

    #[test]
    fn missing_key_column_is_a_schema_error() {
        let err = left_join(&registry(), &sectors(), "NOPE", "CIIU_INT", KeyKind::Numeric)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingColumn { .. })
        ));
    }

    #[test]
    fn joined_row_count_never_drops_below_primary() -> Result<()> {
        let empty_ref = table("ref", &["CIIU_INT", "RAMA"], &[]);
        let joined = left_join(&registry(), &empty_ref, "COD_CIIU", "CIIU_INT", KeyKind::Numeric)?;
        assert_eq!(joined.len(), registry().len());
        Ok(())
    }
}
