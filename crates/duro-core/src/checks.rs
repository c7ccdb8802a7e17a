//! Pre-flight invariants run before a reschedule is allowed to proceed
//! (spec §4.L). Each check looks for one category of malformed view
//! directory; all failures are collected and reported together rather than
//! stopping at the first one.

use std::collections::BTreeMap;

use crate::error::SchedulerError;
use crate::loader::LoadedView;

/// Run every structural check against the loaded view set, returning one
/// combined [`SchedulerError::TablesWithoutRequiredFiles`] if anything
/// failed.
pub fn run_checks(views: &BTreeMap<String, LoadedView>) -> Result<(), SchedulerError> {
    let mut failures = Vec::new();

    failures.extend(tests_without_ddl(views));
    failures.extend(processors_without_select(views));
    failures.extend(processors_without_ddl(views));

    if failures.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::TablesWithoutRequiredFiles(
            failures.join("; "),
        ))
    }
}

/// Whether `view` has a materializing definition: the plain `.sql` for a
/// table with no processor, or the load DDL sibling when it has one.
fn has_ddl(view: &LoadedView) -> bool {
    if view.processor.is_some() {
        view.load_ddl().is_some()
    } else {
        view.materializing_sql.is_some()
    }
}

/// A `*_test.sql` file exists with no corresponding materializing `.sql`
/// for the same table.
fn tests_without_ddl(views: &BTreeMap<String, LoadedView>) -> Vec<String> {
    views
        .iter()
        .filter(|(_, v)| !v.test_queries.is_empty() && !has_ddl(v))
        .map(|(name, _)| format!("{name}: has tests but no materializing query"))
        .collect()
}

/// A `.py` processor exists with no sibling `_select.sql` to feed it.
fn processors_without_select(views: &BTreeMap<String, LoadedView>) -> Vec<String> {
    views
        .iter()
        .filter(|(_, v)| v.processor.is_some() && v.input_query.is_none())
        .map(|(name, _)| format!("{name}: has a processor but no select query"))
        .collect()
}

/// A `.py` processor exists but the target table has no DDL (sibling
/// `.sql`) to load its output into.
fn processors_without_ddl(views: &BTreeMap<String, LoadedView>) -> Vec<String> {
    views
        .iter()
        .filter(|(_, v)| v.processor.is_some() && v.load_ddl().is_none())
        .map(|(name, _)| format!("{name}: has a processor but no DDL to load into"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadedView;

    fn empty_view() -> LoadedView {
        LoadedView::default()
    }

    #[test]
    fn passes_when_every_view_is_well_formed() {
        let mut views = BTreeMap::new();
        let mut v = empty_view();
        v.materializing_sql = Some("select 1".into());
        views.insert("reporting.orders".to_string(), v);
        assert!(run_checks(&views).is_ok());
    }

    #[test]
    fn flags_tests_without_ddl() {
        let mut views = BTreeMap::new();
        let mut v = empty_view();
        v.test_queries.push("not_null".into());
        views.insert("reporting.orders".to_string(), v);
        let err = run_checks(&views).unwrap_err();
        assert!(matches!(err, SchedulerError::TablesWithoutRequiredFiles(_)));
    }

    #[test]
    fn flags_processor_without_select() {
        let mut views = BTreeMap::new();
        let mut v = empty_view();
        v.processor = Some("build.py".into());
        v.materializing_sql = Some("create table reporting.orders (id int)".into());
        views.insert("reporting.orders".to_string(), v);
        assert!(run_checks(&views).is_err());
    }

    #[test]
    fn flags_processor_without_load_ddl() {
        let mut views = BTreeMap::new();
        let mut v = empty_view();
        v.processor = Some("build.py".into());
        v.input_query = Some("select * from raw.orders".into());
        views.insert("reporting.orders".to_string(), v);
        assert!(run_checks(&views).is_err());
    }

    #[test]
    fn passes_for_well_formed_processor_table() {
        let mut views = BTreeMap::new();
        let mut v = empty_view();
        v.processor = Some("build.py".into());
        v.input_query = Some("select * from raw.orders".into());
        v.materializing_sql = Some("create table reporting.orders (id int)".into());
        views.insert("reporting.orders".to_string(), v);
        assert!(run_checks(&views).is_ok());
    }
}
