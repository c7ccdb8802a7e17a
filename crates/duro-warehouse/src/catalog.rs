//! Dependent-view discovery (spec §4.G.3): joins `pg_class`, `pg_namespace`,
//! `pg_depend`, and `pg_rewrite` to find every view whose definition
//! references a given table.

/// One dependent view found by [`DEPENDENT_VIEWS_QUERY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentView {
    pub schema: String,
    pub name: String,
    pub definition: String,
}

/// Parameterized `$1 = schema`, `$2 = table`.
pub const DEPENDENT_VIEWS_QUERY: &str = r#"
SELECT DISTINCT nv.nspname AS view_schema,
                v.relname  AS view_name,
                pg_get_viewdef(v.oid, true) AS view_definition
FROM pg_depend d
JOIN pg_rewrite r  ON r.oid = d.objid
JOIN pg_class v    ON v.oid = r.ev_class
JOIN pg_namespace nv ON nv.oid = v.relnamespace
JOIN pg_class t    ON t.oid = d.refobjid
JOIN pg_namespace nt ON nt.oid = t.relnamespace
WHERE v.relkind = 'v'
  AND t.relname = $2
  AND nt.nspname = $1
"#;

/// Rewrite `definition` so every occurrence of `schema.table` (optionally
/// double-quoted) instead points at `schema.table_duro_temp`, ahead of the
/// `CREATE OR REPLACE VIEW` that re-points the dependent view at the new
/// generation (spec §4.G.3).
pub fn rewrite_definition(definition: &str, schema: &str, table: &str, temp_suffix: &str) -> String {
    let plain = format!("{schema}.{table}");
    let quoted = format!("\"{schema}\".\"{table}\"");
    let replacement_plain = format!("{schema}.{table}{temp_suffix}");
    let replacement_quoted = format!("\"{schema}\".\"{table}{temp_suffix}\"");

    definition
        .replace(&quoted, &replacement_quoted)
        .replace(&plain, &replacement_plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_plain_and_quoted_references() {
        let def = "select * from reporting.orders";
        assert_eq!(
            rewrite_definition(def, "reporting", "orders", "_duro_temp"),
            "select * from reporting.orders_duro_temp"
        );

        let def = r#"select * from "reporting"."orders""#;
        assert_eq!(
            rewrite_definition(def, "reporting", "orders", "_duro_temp"),
            r#"select * from "reporting"."orders_duro_temp""#
        );
    }
}
