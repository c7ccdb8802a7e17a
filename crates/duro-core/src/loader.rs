//! View loader (spec §4.B): walks a directory tree of view definitions and
//! classifies each file by its suffix into the pieces a `Table` is built
//! from.
//!
//! Directory layout: one subdirectory per schema, files named
//! `<table>.sql` (materializing query), `<table>_select.sql` +
//! `<table>.py` (processor pair), `<table>_test.sql` (one or more test
//! assertions), `<table>.conf` (config overrides), and an optional
//! `requirements.txt` per schema directory for processor dependencies.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

/// Everything the loader found for one `schema.table`, prior to graph
/// construction. Config layering is not among it: `.conf` files are read
/// directly off disk by `merge_table_config`, not synthesized into a view
/// here (spec §4.C).
#[derive(Debug, Clone, Default)]
pub struct LoadedView {
    /// The plain `<table>.sql` file: the materializing query when there is
    /// no processor, or the load DDL for the processor's output when
    /// there is one.
    pub materializing_sql: Option<String>,
    /// The `<table>_select.sql` file: only present alongside a processor.
    pub input_query: Option<String>,
    pub interval: Option<String>,
    pub processor: Option<String>,
    pub test_queries: Vec<String>,
}

impl LoadedView {
    /// The query that drives materialization: the processor's input query
    /// when a processor exists, otherwise the plain materializing query
    /// (spec §4.B).
    pub fn select_query(&self) -> Option<&str> {
        if self.processor.is_some() {
            self.input_query.as_deref()
        } else {
            self.materializing_sql.as_deref()
        }
    }

    /// The DDL used to (re)create the table from a processor's output.
    /// Only meaningful when `processor` is present (spec §4.H step 5).
    pub fn load_ddl(&self) -> Option<&str> {
        if self.processor.is_some() {
            self.materializing_sql.as_deref()
        } else {
            None
        }
    }
}

/// A `requirements.txt` found alongside a processor; kept separate since a
/// broken or unreadable one is non-fatal (logged, not an aborting error).
#[derive(Debug, Clone)]
pub struct SandboxRequirements {
    pub schema: String,
    pub path: std::path::PathBuf,
}

#[derive(Debug, Default)]
pub struct LoadResult {
    pub views: BTreeMap<String, LoadedView>,
    pub requirements: Vec<SandboxRequirements>,
}

static INTERVAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<base>.+?)[\s]*[-\u{2013}\u{2014}][\s]*(?P<interval>\d+[mhdwMHDW])$").unwrap());

/// Split a file stem like `orders - 1h` into (`orders`, `Some("1h")`), or
/// leave it untouched if there's no trailing interval suffix.
fn split_interval_suffix(stem: &str) -> (String, Option<String>) {
    match INTERVAL_SUFFIX.captures(stem) {
        Some(caps) => (
            caps["base"].trim().to_string(),
            Some(caps["interval"].to_string()),
        ),
        None => (stem.to_string(), None),
    }
}

fn entry_for<'a>(views: &'a mut BTreeMap<String, LoadedView>, name: &str) -> &'a mut LoadedView {
    views.entry(name.to_string()).or_default()
}

/// Walk `views_path` and classify every file into the views map. Ordering
/// within a schema directory does not matter; every file is visited
/// exactly once regardless of how many categories end up touching the
/// same table.
pub fn load_views(views_path: &Path) -> std::io::Result<LoadResult> {
    let mut result = LoadResult::default();

    for entry in WalkDir::new(views_path).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        if file_name == "requirements.txt" {
            let Some(schema) = dir_schema(views_path, path) else {
                continue;
            };
            result.requirements.push(SandboxRequirements {
                schema,
                path: path.to_path_buf(),
            });
            continue;
        }

        if extension == "conf" {
            // Config layers are read directly off disk by
            // `merge_table_config`; the loader does not synthesize a view
            // entry from them (spec §4.C layer 3, e.g. `reporting/reporting.conf`,
            // would otherwise fabricate a phantom `reporting.reporting` view).
            continue;
        }

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let schema = dir_schema(views_path, path);

        match extension {
            "py" => {
                let Some(table_name) = qualified_name(schema.as_deref(), stem) else {
                    continue;
                };
                let contents = std::fs::read_to_string(path).unwrap_or_default();
                entry_for(&mut result.views, &table_name).processor = Some(contents);
            }
            "sql" => {
                let contents = std::fs::read_to_string(path)?;
                if let Some(base) = stem.strip_suffix("_test") {
                    let Some(table_name) = qualified_name(schema.as_deref(), base) else {
                        continue;
                    };
                    entry_for(&mut result.views, &table_name)
                        .test_queries
                        .push(contents);
                } else if let Some(base) = stem.strip_suffix("_select") {
                    let (base, interval) = split_interval_suffix(base);
                    let Some(table_name) = qualified_name(schema.as_deref(), &base) else {
                        continue;
                    };
                    let view = entry_for(&mut result.views, &table_name);
                    view.input_query = Some(contents);
                    if interval.is_some() {
                        view.interval = interval;
                    }
                } else {
                    let (base, interval) = split_interval_suffix(stem);
                    let Some(table_name) = qualified_name(schema.as_deref(), &base) else {
                        continue;
                    };
                    let view = entry_for(&mut result.views, &table_name);
                    view.materializing_sql = Some(contents);
                    if interval.is_some() {
                        view.interval = interval;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(result)
}

/// The directory schema a file lives under: its first path component
/// relative to `views_path`, when the file is nested at least one
/// directory deep. Files directly under `views_path` have no directory
/// schema.
fn dir_schema(views_path: &Path, file_path: &Path) -> Option<String> {
    let relative = file_path.strip_prefix(views_path).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    if components.next().is_none() {
        return None;
    }
    Some(first.as_os_str().to_string_lossy().into_owned())
}

/// The fully-qualified `schema.table` name for a file stem (with any
/// trailing interval suffix already stripped), matching
/// `parse_filename`'s precedence: a stem that already contains a dot
/// (e.g. `first.cities`) is used verbatim, discarding the directory name
/// entirely; otherwise the directory schema, if any, is prefixed. A
/// schema-less stem with no embedded dot names no table and is skipped.
fn qualified_name(schema: Option<&str>, stem: &str) -> Option<String> {
    if stem.contains('.') {
        Some(stem.to_string())
    } else {
        schema.map(|schema| format!("{schema}.{stem}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn splits_base_name_and_interval_suffix() {
        assert_eq!(
            split_interval_suffix("orders - 1h"),
            ("orders".to_string(), Some("1h".to_string()))
        );
        assert_eq!(
            split_interval_suffix("orders"),
            ("orders".to_string(), None)
        );
    }

    #[test]
    fn handles_en_dash_and_em_dash_separators() {
        assert_eq!(
            split_interval_suffix("orders \u{2013} 30m").1,
            Some("30m".to_string())
        );
        assert_eq!(
            split_interval_suffix("orders\u{2014}1d").1,
            Some("1d".to_string())
        );
    }

    #[test]
    fn loads_plain_materializing_query() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("reporting")).unwrap();
        fs::write(
            dir.path().join("reporting").join("orders - 1h.sql"),
            "select 1",
        )
        .unwrap();

        let result = load_views(dir.path()).unwrap();
        let view = result.views.get("reporting.orders").unwrap();
        assert_eq!(view.select_query(), Some("select 1"));
        assert_eq!(view.interval.as_deref(), Some("1h"));
    }

    #[test]
    fn loads_processor_pair_and_test() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("reporting")).unwrap();
        fs::write(
            dir.path().join("reporting").join("orders_select.sql"),
            "select * from raw.orders",
        )
        .unwrap();
        fs::write(
            dir.path().join("reporting").join("orders.py"),
            "print('build')",
        )
        .unwrap();
        fs::write(
            dir.path().join("reporting").join("orders.sql"),
            "create table reporting.orders (id int)",
        )
        .unwrap();
        fs::write(
            dir.path().join("reporting").join("orders_test.sql"),
            "select count(*) from reporting.orders where id is null",
        )
        .unwrap();

        let result = load_views(dir.path()).unwrap();
        let view = result.views.get("reporting.orders").unwrap();
        assert_eq!(view.select_query(), Some("select * from raw.orders"));
        assert_eq!(view.load_ddl(), Some("create table reporting.orders (id int)"));
        assert!(view.processor.is_some());
        assert_eq!(view.test_queries.len(), 1);
    }

    #[test]
    fn collects_requirements_per_schema() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("reporting")).unwrap();
        fs::write(
            dir.path().join("reporting").join("requirements.txt"),
            "pandas==2.0.0\n",
        )
        .unwrap();

        let result = load_views(dir.path()).unwrap();
        assert_eq!(result.requirements.len(), 1);
        assert_eq!(result.requirements[0].schema, "reporting");
    }

    #[test]
    fn conf_files_never_synthesize_a_view() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("global.conf"), "distkey = id\n").unwrap();
        fs::create_dir_all(dir.path().join("reporting")).unwrap();
        fs::write(
            dir.path().join("reporting").join("reporting.conf"),
            "sortkey = created_at\n",
        )
        .unwrap();

        let result = load_views(dir.path()).unwrap();
        assert!(result.views.is_empty());
    }

    #[test]
    fn embedded_schema_dot_in_stem_wins_over_directory_name() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("second")).unwrap();
        fs::write(
            dir.path().join("second").join("first.cities - 1h.sql"),
            "select 1",
        )
        .unwrap();

        let result = load_views(dir.path()).unwrap();
        assert!(result.views.contains_key("first.cities"));
        let view = result.views.get("first.cities").unwrap();
        assert_eq!(view.interval.as_deref(), Some("1h"));
    }

    #[test]
    fn top_level_file_with_embedded_schema_dot_is_recognized() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("first.cities.sql"), "select 1").unwrap();

        let result = load_views(dir.path()).unwrap();
        assert!(result.views.contains_key("first.cities"));
    }

    #[test]
    fn top_level_file_without_embedded_dot_has_no_schema_and_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("orders.sql"), "select 1").unwrap();

        let result = load_views(dir.path()).unwrap();
        assert!(result.views.is_empty());
    }
}
