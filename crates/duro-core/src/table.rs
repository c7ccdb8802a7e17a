//! The `Table` entity (spec §3) and its warehouse-facing config rendering.

use std::collections::BTreeMap;

/// Suffix applied to the in-flight replacement table.
pub const TEMP_SUFFIX: &str = "_duro_temp";
/// Suffix applied to the previous generation, retained briefly.
pub const OLD_SUFFIX: &str = "_duro_old";
/// Suffix applied to the snapshot append-log.
pub const HISTORY_SUFFIX: &str = "_history";

/// Recognized keys in a merged `config` map (spec §3, §4.C).
pub const CONFIG_KEYS: &[&str] = &[
    "distkey",
    "sortkey",
    "diststyle",
    "grant_select",
    "snapshots_interval",
    "snapshots_stored_for",
];

/// A single view-under-management (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub select_query: String,
    pub interval_mins: Option<i64>,
    pub config: BTreeMap<String, String>,
    pub last_created_ts: Option<i64>,
    pub mean_duration_s: Option<f64>,
    pub times_run: i64,
    pub started_ts: Option<i64>,
    pub waiting_ts: Option<i64>,
    pub force: bool,
    pub deleted_ts: Option<i64>,
}

impl Table {
    /// The two dot-separated identifiers making up `name`, if valid.
    pub fn schema_and_table(&self) -> Option<(&str, &str)> {
        split_qualified_name(&self.name)
    }

    pub fn distkey(&self) -> Option<&str> {
        self.config.get("distkey").map(String::as_str)
    }

    pub fn sortkey(&self) -> Option<&str> {
        self.config.get("sortkey").map(String::as_str)
    }

    pub fn diststyle(&self) -> Option<&str> {
        self.config.get("diststyle").map(String::as_str)
    }

    pub fn grant_select(&self) -> Option<&str> {
        self.config.get("grant_select").map(String::as_str)
    }

    /// Interval, in minutes, at which this table's history snapshots are
    /// appended. `None` means this table does not take snapshots at all.
    pub fn snapshots_interval_mins(&self) -> Option<&str> {
        self.config.get("snapshots_interval").map(String::as_str)
    }

    pub fn snapshots_stored_for_mins(&self) -> Option<&str> {
        self.config
            .get("snapshots_stored_for")
            .map(String::as_str)
    }

    /// Whether this table takes history snapshots (spec §4.G.5).
    pub fn stores_snapshots(&self) -> bool {
        self.snapshots_interval_mins().is_some()
    }

    pub fn temp_name(&self) -> String {
        format!("{}{}", self.name, TEMP_SUFFIX)
    }

    pub fn old_name(&self) -> String {
        format!("{}{}", self.name, OLD_SUFFIX)
    }

    pub fn history_name(&self) -> String {
        format!("{}{}", self.name, HISTORY_SUFFIX)
    }
}

/// Split `schema.table` into its two components. Fails if there isn't
/// exactly one dot (spec §3: "two dot-separated identifiers").
pub fn split_qualified_name(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.splitn(2, '.');
    let schema = parts.next()?;
    let table = parts.next()?;
    if table.contains('.') || schema.is_empty() || table.is_empty() {
        return None;
    }
    Some((schema, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table {
            name: "reporting.orders".into(),
            select_query: "select 1".into(),
            interval_mins: Some(60),
            config: BTreeMap::new(),
            last_created_ts: None,
            mean_duration_s: None,
            times_run: 0,
            started_ts: None,
            waiting_ts: None,
            force: false,
            deleted_ts: None,
        }
    }

    #[test]
    fn splits_schema_and_table() {
        assert_eq!(
            split_qualified_name("reporting.orders"),
            Some(("reporting", "orders"))
        );
        assert_eq!(split_qualified_name("orders"), None);
    }

    #[test]
    fn derives_generation_suffixed_names() {
        let table = sample_table();
        assert_eq!(table.temp_name(), "reporting.orders_duro_temp");
        assert_eq!(table.old_name(), "reporting.orders_duro_old");
        assert_eq!(table.history_name(), "reporting.orders_history");
    }

    #[test]
    fn no_snapshots_by_default() {
        assert!(!sample_table().stores_snapshots());
    }
}
