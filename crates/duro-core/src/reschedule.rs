//! Scheduler entry (spec §4.K): runs the view loader, config merger, graph
//! builder, and schedule store as a single "reschedule" action, detecting
//! structural errors before anything touches the warehouse.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::checks::run_checks;
use crate::clock::now_epoch_s;
use crate::config_merge::merge_table_config;
use crate::dot::to_dot;
use crate::error::{SchedulerError, SchedulerResult};
use crate::graph::{Graph, NodeData};
use crate::interval::convert_interval;
use crate::loader::load_views;
use crate::table::{split_qualified_name, Table};
use crate::traits::{ScheduleStore, UpsertSummary};

/// Whether a cycle in the dependency graph aborts the pass or is merely
/// reported. Production rescheduling always runs strict; non-strict exists
/// for diagnostic tooling (spec §4.D: "strict-mode reschedule").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Strict,
    Report,
}

/// Everything a caller needs after a reschedule pass completes, for
/// logging and the summary notification.
#[derive(Debug, Clone, Default)]
pub struct RescheduleOutcome {
    pub upsert: UpsertSummary,
    pub skipped_unchanged_commit: bool,
    /// Test query text per table, for the tree walker's cache (spec §3:
    /// tests live on disk, not in the schedule store).
    pub test_queries: Arc<BTreeMap<String, Vec<String>>>,
    /// Processor load DDL per table, for the tree walker's cache (spec §3,
    /// §4.H: load DDL lives on disk alongside the processor, not in the
    /// schedule store).
    pub load_ddl: Arc<BTreeMap<String, String>>,
    /// Processor script text per table (spec §4.H), for the processor
    /// runner's cache.
    pub scripts: Arc<BTreeMap<String, String>>,
    /// `requirements.txt` contents per schema (spec §4.H supplement), for
    /// the processor runner's sandbox setup.
    pub requirements: Arc<BTreeMap<String, String>>,
}

/// Run one reschedule pass against `views_path`, persisting the result
/// into `store` and the dependency graph to `graph_path`.
///
/// `head_commit`, when driven from a git checkout, enables the
/// skip-if-unchanged optimization (spec §4.K). Passing `None` always runs
/// the full pass.
pub async fn reschedule<S: ScheduleStore>(
    store: &S,
    views_path: &Path,
    graph_path: &Path,
    cycle_mode: CycleMode,
    head_commit: Option<&str>,
) -> SchedulerResult<RescheduleOutcome> {
    if let Some(hash) = head_commit {
        let last = store
            .last_processed_commit()
            .await
            .map_err(|err| SchedulerError::GitError(err.to_string()))?;
        if last.as_deref() == Some(hash) {
            return Ok(RescheduleOutcome {
                upsert: UpsertSummary::default(),
                skipped_unchanged_commit: true,
                test_queries: Arc::new(BTreeMap::new()),
                load_ddl: Arc::new(BTreeMap::new()),
                scripts: Arc::new(BTreeMap::new()),
                requirements: Arc::new(BTreeMap::new()),
            });
        }
    }

    let built = build_graph(views_path, graph_path, cycle_mode)?;

    let tables = build_tables(views_path, &built.views, &built.graph)?;

    let upsert = store
        .upsert_tables(&tables)
        .await
        .map_err(|err| SchedulerError::ConfigFieldError(err.to_string()))?;

    if let Some(hash) = head_commit {
        store
            .record_processed_commit(hash, now_epoch_s())
            .await
            .map_err(|err| SchedulerError::GitError(err.to_string()))?;
    }

    tracing::info!(
        inserted = upsert.inserted.len(),
        changed = upsert.changed.len(),
        deleted = upsert.deleted.len(),
        "reschedule: succeeded"
    );

    Ok(RescheduleOutcome {
        upsert,
        skipped_unchanged_commit: false,
        test_queries: built.test_queries,
        load_ddl: built.load_ddl,
        scripts: built.scripts,
        requirements: built.requirements,
    })
}

/// Everything derivable from the views tree alone, without touching the
/// schedule store: the dependency graph plus the on-disk caches the tree
/// walker needs (spec §3: tests, load DDL, processor scripts, and
/// `requirements.txt` all live on disk, not in the store).
pub struct GraphBuild {
    pub graph: Graph,
    pub views: BTreeMap<String, crate::loader::LoadedView>,
    pub test_queries: Arc<BTreeMap<String, Vec<String>>>,
    pub load_ddl: Arc<BTreeMap<String, String>>,
    pub scripts: Arc<BTreeMap<String, String>>,
    pub requirements: Arc<BTreeMap<String, String>>,
}

/// Load the views tree, build its dependency graph, and persist the
/// `.dot` observability artifact, without touching the schedule store.
/// Shared by `reschedule` and by `duro-cli`'s `serve` boot, since the
/// graph file itself is "not re-read by the runtime after reschedule"
/// (spec §6) — each process that needs the graph's shape rebuilds it from
/// disk.
pub fn build_graph(views_path: &Path, graph_path: &Path, cycle_mode: CycleMode) -> SchedulerResult<GraphBuild> {
    let load_result = load_views(views_path)?;
    run_checks(&load_result.views)?;

    for req in &load_result.requirements {
        tracing::info!(schema = %req.schema, path = %req.path.display(), "requirements.txt: found");
    }

    let mut graph = Graph::new();
    for (name, view) in &load_result.views {
        let interval_mins = convert_interval(view.interval.as_deref())?;
        graph.add_node(
            name.clone(),
            NodeData {
                contents: view.select_query().map(str::to_string).unwrap_or_default(),
                interval_mins,
            },
        );
    }
    graph.build_edges();

    std::fs::write(graph_path, to_dot(&graph)).map_err(SchedulerError::Io)?;

    let cycles = graph.find_cycles();
    if !cycles.is_empty() && cycle_mode == CycleMode::Strict {
        return Err(SchedulerError::NotADAG(cycles));
    }

    let roots_without_interval = graph.roots_without_interval();
    if !roots_without_interval.is_empty() {
        return Err(SchedulerError::RootsWithoutInterval(roots_without_interval));
    }

    let test_queries = Arc::new(collect_test_queries(&load_result.views));
    let load_ddl = Arc::new(collect_load_ddl(&load_result.views));
    let scripts = Arc::new(collect_scripts(&load_result.views));
    let requirements = Arc::new(collect_requirements(&load_result.requirements));

    Ok(GraphBuild {
        graph,
        views: load_result.views,
        test_queries,
        load_ddl,
        scripts,
        requirements,
    })
}

/// Test query text per table, keyed the same way as the schedule store's
/// table names (spec §3).
fn collect_test_queries(
    views: &BTreeMap<String, crate::loader::LoadedView>,
) -> BTreeMap<String, Vec<String>> {
    views
        .iter()
        .filter(|(_, v)| !v.test_queries.is_empty())
        .map(|(name, v)| (name.clone(), v.test_queries.clone()))
        .collect()
}

/// Processor load DDL per table, for tables that have one (spec §4.H).
fn collect_load_ddl(
    views: &BTreeMap<String, crate::loader::LoadedView>,
) -> BTreeMap<String, String> {
    views
        .iter()
        .filter_map(|(name, v)| v.load_ddl().map(|ddl| (name.clone(), ddl.to_string())))
        .collect()
}

/// Processor script text per table, for tables that have one (spec §4.H).
fn collect_scripts(views: &BTreeMap<String, crate::loader::LoadedView>) -> BTreeMap<String, String> {
    views
        .iter()
        .filter_map(|(name, v)| v.processor.clone().map(|script| (name.clone(), script)))
        .collect()
}

/// `requirements.txt` contents per schema (spec §4.H supplement). A schema
/// with multiple `requirements.txt` files (there should be at most one)
/// keeps the last one read.
fn collect_requirements(requirements: &[crate::loader::SandboxRequirements]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for req in requirements {
        match std::fs::read_to_string(&req.path) {
            Ok(contents) => {
                out.insert(req.schema.clone(), contents);
            }
            Err(err) => {
                tracing::warn!(schema = %req.schema, path = %req.path.display(), error = %err, "requirements.txt: failed to read");
            }
        }
    }
    out
}

fn build_tables(
    views_path: &Path,
    views: &BTreeMap<String, crate::loader::LoadedView>,
    graph: &Graph,
) -> SchedulerResult<Vec<Table>> {
    let mut tables = Vec::with_capacity(views.len());
    for (name, view) in views {
        let Some((schema, table_name)) = split_qualified_name(name) else {
            continue;
        };
        let config = merge_table_config(views_path, schema, table_name);

        let interval_mins = graph.node(name).and_then(|n| n.interval_mins);

        tables.push(Table {
            name: name.clone(),
            select_query: view.select_query().map(str::to_string).unwrap_or_default(),
            interval_mins,
            config,
            last_created_ts: None,
            mean_duration_s: None,
            times_run: 0,
            started_ts: None,
            waiting_ts: None,
            force: false,
            deleted_ts: None,
        });
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_mode_variants_are_distinct() {
        assert_ne!(CycleMode::Strict, CycleMode::Report);
    }
}
