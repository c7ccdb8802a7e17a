//! Config merger (spec §4.C): layered, flat key/value `.conf` files merged
//! with additive/subtractive `grant_select` permission folding.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A flat key/value config file, INI-like but without a mandatory
/// section header (the original tool's `configparser` synthesizes one).
pub type RawConfig = BTreeMap<String, String>;

/// Read a flat `key = value` config file. Missing files are treated as
/// empty (a view simply has no config at that layer).
pub fn read_config(path: &Path) -> RawConfig {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return RawConfig::new();
    };

    let mut config = RawConfig::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            // Section headers are tolerated but ignored; the format is
            // flat regardless of whether a section wraps it.
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            config.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    config
}

/// The five config layers in override precedence (spec §4.C), for a given
/// `schema.table`, rooted at `views_path`.
fn config_layer_paths(views_path: &Path, schema: &str, table: &str) -> Vec<PathBuf> {
    vec![
        views_path.join("global.conf"),
        views_path.join(format!("{schema}.conf")),
        views_path.join(schema).join(format!("{schema}.conf")),
        views_path.join(format!("{schema}.{table}.conf")),
        views_path.join(schema).join(format!("{table}.conf")),
    ]
}

/// Merge the five layered config files for a table into one normalized map.
pub fn merge_table_config(views_path: &Path, schema: &str, table: &str) -> RawConfig {
    let layers: Vec<RawConfig> = config_layer_paths(views_path, schema, table)
        .iter()
        .map(|p| read_config(p))
        .collect();

    let mut merged = RawConfig::new();
    for layer in &layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }

    normalize_nulls(&mut merged);

    if layers.iter().any(|l| l.contains_key("grant_select")) {
        let values: Vec<Option<&str>> = layers
            .iter()
            .map(|l| l.get("grant_select").map(String::as_str))
            .collect();
        merged.insert("grant_select".to_string(), merge_grant_select(&values));
    }

    merged
}

/// Values equal to the literals `"null"`, `"None"`, or empty normalize to
/// absent (removed from the map) per spec §3.
fn normalize_nulls(config: &mut RawConfig) {
    config.retain(|_, value| !matches!(value.as_str(), "null" | "None" | ""));
}

/// Fold `grant_select` across layers: a plain comma-separated list replaces
/// the accumulator; a list where every entry is `+`/`-` prefixed adds or
/// removes; final output is sorted and comma-joined (spec §4.C).
pub fn merge_grant_select(layers: &[Option<&str>]) -> String {
    let mut acc: BTreeSet<String> = BTreeSet::new();
    for layer in layers {
        acc = merge_permissions(acc, *layer);
    }
    acc.into_iter().collect::<Vec<_>>().join(", ")
}

fn merge_permissions(acc: BTreeSet<String>, value: Option<&str>) -> BTreeSet<String> {
    let Some(value) = value else { return acc };
    if value.is_empty() {
        return acc;
    }

    let entries: Vec<&str> = value.split(',').map(str::trim).collect();
    let has_prefix = entries.iter().any(|e| e.starts_with('+') || e.starts_with('-'));

    if !has_prefix {
        return entries.into_iter().map(str::to_string).collect();
    }

    let mut next = acc;
    for entry in entries {
        if let Some(name) = entry.strip_prefix('+') {
            next.insert(name.to_string());
        } else if let Some(name) = entry.strip_prefix('-') {
            next.remove(name);
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn plain_list_replaces_accumulator() {
        let layers = vec![Some("Jane"), Some("Tegan, Sara"), Some("+Kendrick")];
        assert_eq!(merge_grant_select(&layers), "Kendrick, Sara, Tegan");
    }

    #[test]
    fn subtractive_entry_removes_from_accumulator() {
        let layers = vec![Some("Jane"), Some("Tegan, Sara"), Some("-Sara")];
        assert_eq!(merge_grant_select(&layers), "Tegan");
    }

    #[test]
    fn additive_entry_after_replace_keeps_both() {
        let layers = vec![
            Some("Jane"),
            Some("Tegan, Sara"),
            Some("+Kendrick"),
            Some("-Sara"),
        ];
        assert_eq!(merge_grant_select(&layers), "Kendrick, Tegan");
    }

    #[test]
    fn null_none_and_empty_values_normalize_to_absent() {
        let mut config = RawConfig::new();
        config.insert("distkey".into(), "null".into());
        config.insert("sortkey".into(), "None".into());
        config.insert("diststyle".into(), "".into());
        config.insert("grant_select".into(), "alice".into());
        normalize_nulls(&mut config);
        assert!(!config.contains_key("distkey"));
        assert!(!config.contains_key("sortkey"));
        assert!(!config.contains_key("diststyle"));
        assert_eq!(config.get("grant_select").unwrap(), "alice");
    }

    #[test]
    fn merges_five_layers_with_correct_precedence() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("global.conf"), "distkey = id\n").unwrap();
        fs::create_dir_all(root.join("reporting")).unwrap();
        fs::write(
            root.join("reporting").join("reporting.conf"),
            "sortkey = created_at\n",
        )
        .unwrap();
        fs::write(
            root.join("reporting").join("orders.conf"),
            "distkey = order_id\n",
        )
        .unwrap();

        let merged = merge_table_config(root, "reporting", "orders");
        assert_eq!(merged.get("distkey").unwrap(), "order_id");
        assert_eq!(merged.get("sortkey").unwrap(), "created_at");
    }

    #[test]
    fn missing_config_files_merge_to_empty() {
        let dir = TempDir::new().unwrap();
        let merged = merge_table_config(dir.path(), "reporting", "orders");
        assert!(merged.is_empty());
    }
}
