//! The tree walker (spec §4.I): the recursive, waiting-aware,
//! mean-timeout-bounded rematerialization driver. This is the component
//! everything else in the crate exists to serve.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_recursion::async_recursion;

use crate::clock::now_epoch_s;
use crate::error::{CreationError, CreationResult};
use crate::graph::Graph;
use crate::table::Table;
use crate::timestamps::{Phase, Timestamps};
use crate::traits::{Notifier, NotifyClass, ProcessorRunner, ScheduleStore, WarehouseConn};

/// A stale `waiting` flag older than this is assumed abandoned by a crashed
/// sibling branch and is cleared rather than honored (spec §4.I.2, §5).
const WAITING_STALE_THRESHOLD_S: i64 = 2 * 60 * 60;

/// Poll interval while waiting for an in-flight rebuild to finish.
const WAIT_POLL_INTERVAL_S: u64 = 10;

/// Per-rebuild deadline is this multiple of the table's historical mean.
const TIMEOUT_MULTIPLIER: f64 = 5.0;

/// Owns the external capabilities and drives `create_tree` over them. One
/// instance is built at engine startup and reused across every poll.
pub struct TreeWalker<S, W, P, N> {
    store: Arc<S>,
    warehouse: Arc<W>,
    processor: Option<Arc<P>>,
    notifier: Arc<N>,
    /// Test query text per table, refreshed each reschedule pass (spec §3:
    /// tests live on disk, not in the schedule store).
    test_queries: Arc<BTreeMap<String, Vec<String>>>,
    /// Processor load DDL per table, refreshed each reschedule pass
    /// (spec §3, §4.H: load DDL lives on disk alongside the processor).
    load_ddl: Arc<BTreeMap<String, String>>,
}

impl<S, W, P, N> TreeWalker<S, W, P, N>
where
    S: ScheduleStore + 'static,
    W: WarehouseConn + 'static,
    P: ProcessorRunner + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        warehouse: Arc<W>,
        processor: Option<Arc<P>>,
        notifier: Arc<N>,
        test_queries: Arc<BTreeMap<String, Vec<String>>>,
        load_ddl: Arc<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            store,
            warehouse,
            processor,
            notifier,
            test_queries,
            load_ddl,
        }
    }

    /// Recursively rematerialize `name` and everything it depends on, in
    /// dependency order, then itself. Every error is caught at this
    /// boundary: logged, notified, and swallowed so the walk of sibling
    /// subtrees continues (spec §7, "creation errors ... continue").
    #[async_recursion]
    pub async fn create_tree(&self, graph: &Graph, name: &str, interval_hint: Option<i64>, depth: usize) {
        let now = now_epoch_s();

        let mut table = match self.store.load_table_details(name).await {
            Ok(Some(table)) => table,
            Ok(None) => {
                self.notify_creation_error(&CreationError::TableNotFoundInDB(name.to_string()))
                    .await;
                return;
            }
            Err(err) => {
                tracing::error!(table = name, depth, error = %err, "load_table_details: failed");
                return;
            }
        };

        // A view that declares no interval of its own inherits the nearest
        // ancestor's (spec §4.I step 1); substitute it in before deciding
        // staleness so `should_be_created` never sees a bare `None` for a
        // child relying on inheritance.
        let effective_interval = table.interval_mins.or(interval_hint);
        table.interval_mins = effective_interval;

        let should_create = match self.should_be_created(&table, now).await {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(table = name, depth, error = %err, "should_be_created: failed");
                return;
            }
        };
        if !should_create {
            return;
        }

        let children = match graph.children(name) {
            Some(children) => children.clone(),
            None => {
                self.notify_creation_error(&CreationError::TableNotFoundInGraph(name.to_string()))
                    .await;
                return;
            }
        };

        for child in &children {
            if let Err(err) = self.store.mark_waiting(name, Some(now_epoch_s())).await {
                tracing::error!(table = name, error = %err, "mark_waiting(true): failed");
            }
            self.create_tree(graph, child, effective_interval, depth + 1).await;
            if let Err(err) = self.store.mark_waiting(name, None).await {
                tracing::error!(table = name, error = %err, "mark_waiting(false): failed");
            }
        }

        tracing::info!(table = name, depth, "create_table: starting");
        match self.create_table(&table).await {
            Ok(()) => {
                tracing::info!(table = name, depth, "create_table: succeeded");
            }
            Err(err) => {
                tracing::warn!(table = name, depth, error = %err, "create_table: failed");
                if let Err(reset_err) = self.store.reset_start(name).await {
                    tracing::error!(table = name, error = %reset_err, "reset_start: failed");
                }
                self.notify_creation_error(&err).await;
            }
        }
    }

    /// `create_single_table` (spec §6, "for operator use"): runs §4.I.2 for
    /// one named table directly, bypassing the tree walk entirely — no
    /// child recursion, no waiting-flag handling (supplemented from
    /// `create_single_table.py`).
    pub async fn create_single(&self, name: &str) {
        let table = match self.store.load_table_details(name).await {
            Ok(Some(table)) => table,
            Ok(None) => {
                self.notify_creation_error(&CreationError::TableNotFoundInDB(name.to_string()))
                    .await;
                return;
            }
            Err(err) => {
                tracing::error!(table = name, error = %err, "load_table_details: failed");
                return;
            }
        };

        tracing::info!(table = name, "create_table: starting");
        match self.create_table(&table).await {
            Ok(()) => tracing::info!(table = name, "create_table: succeeded"),
            Err(err) => {
                tracing::warn!(table = name, error = %err, "create_table: failed");
                if let Err(reset_err) = self.store.reset_start(name).await {
                    tracing::error!(table = name, error = %reset_err, "reset_start: failed");
                }
                self.notify_creation_error(&err).await;
            }
        }
    }

    /// spec §4.I.2.
    async fn should_be_created(&self, table: &Table, now: i64) -> Result<bool, S::Error> {
        if let Some(waiting_s) = self.store.get_time_waiting(&table.name, now).await? {
            if waiting_s <= WAITING_STALE_THRESHOLD_S {
                return Ok(false);
            }
            self.store.mark_waiting(&table.name, None).await?;
        }

        if self.store.get_time_running(&table.name, now).await?.is_some() {
            let finished = self.wait_till_finished(&table.name).await?;
            if finished {
                return Ok(false);
            }
            // wait_till_finished returned false: the run timed out and was
            // reset, so fall through and decide afresh as if not running.
        }

        if table.force {
            return Ok(true);
        }

        match (table.last_created_ts, table.interval_mins) {
            (None, _) | (_, None) => Ok(true),
            (Some(last_created), Some(interval_mins)) => {
                let fresh = (now - last_created) / 60 <= interval_mins;
                Ok(!fresh)
            }
        }
    }

    /// spec §4.I, "wait_till_finished". Returns `true` once the run
    /// disappears on its own, `false` if it was reset because it ran past
    /// its timeout (or no mean exists to bound it at all).
    async fn wait_till_finished(&self, name: &str) -> Result<bool, S::Error> {
        let Some(mean) = self.store.get_average_completion_time(name).await? else {
            self.store.reset_start(name).await?;
            return Ok(false);
        };

        loop {
            tokio::time::sleep(Duration::from_secs(WAIT_POLL_INTERVAL_S)).await;
            let now = now_epoch_s();
            match self.store.get_time_running(name, now).await? {
                None => return Ok(true),
                Some(time_running) => {
                    if time_running as f64 > TIMEOUT_MULTIPLIER * mean {
                        self.store.reset_start(name).await?;
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// spec §4.I.2, "create_table": the rebuild itself, bounded by the
    /// per-table timeout derived from its historical mean.
    async fn create_table(&self, table: &Table) -> CreationResult<()> {
        let mean = self
            .store
            .get_average_completion_time(&table.name)
            .await
            .map_err(|err| store_error(table, err))?;

        let mut timestamps = Timestamps::new();
        timestamps.log(Phase::Start, now_epoch_s());
        self.store
            .log_start(&table.name, now_epoch_s())
            .await
            .map_err(|err| store_error(table, err))?;

        let body = self.create_table_body(table, &mut timestamps);

        match mean {
            Some(mean_s) => {
                let deadline = Duration::from_secs_f64((TIMEOUT_MULTIPLIER * mean_s).max(0.0));
                match tokio::time::timeout(deadline, body).await {
                    Ok(result) => result,
                    Err(_) => Err(CreationError::QueryTimeoutError {
                        table: table.name.clone(),
                        deadline_s: TIMEOUT_MULTIPLIER * mean_s,
                    }),
                }
            }
            None => body.await,
        }
    }

    async fn create_table_body(&self, table: &Table, timestamps: &mut Timestamps) -> CreationResult<()> {
        timestamps.log(Phase::Connect, now_epoch_s());
        timestamps.log(Phase::Select, now_epoch_s());

        match &self.processor {
            Some(processor) => {
                let load_ddl = self.load_ddl.get(&table.name).map(String::as_str).unwrap_or_default();
                processor
                    .run(table, load_ddl)
                    .await
                    .map_err(|err| CreationError::ProcessorRunError {
                        table: table.name.clone(),
                        output: err.to_string(),
                    })?;
                timestamps.log(Phase::Process, now_epoch_s());
                timestamps.log(Phase::Csv, now_epoch_s());
                timestamps.log(Phase::S3, now_epoch_s());
                timestamps.log(Phase::Insert, now_epoch_s());
                timestamps.log(Phase::CleanCsv, now_epoch_s());
            }
            None => {
                self.warehouse
                    .create_temp_table(table)
                    .await
                    .map_err(|err| CreationError::TableCreationError {
                        table: table.name.clone(),
                        message: err.to_string(),
                    })?;
                timestamps.log(Phase::CreateTemp, now_epoch_s());
            }
        }

        let empty = Vec::new();
        let test_queries = self.test_queries.get(&table.name).unwrap_or(&empty);
        let outcomes = self
            .warehouse
            .run_tests(table, test_queries)
            .await
            .map_err(|err| CreationError::TableCreationError {
                table: table.name.clone(),
                message: err.to_string(),
            })?;
        timestamps.log(Phase::Tests, now_epoch_s());

        let failed_columns: Vec<String> = outcomes
            .iter()
            .filter(|outcome| !outcome.passed)
            .map(|outcome| outcome.column.clone())
            .collect();
        if !failed_columns.is_empty() {
            return Err(CreationError::TestsFailedError {
                table: table.name.clone(),
                failed_columns,
            });
        }

        self.warehouse
            .replace_old_table(table)
            .await
            .map_err(|err| CreationError::TableCreationError {
                table: table.name.clone(),
                message: err.to_string(),
            })?;
        timestamps.log(Phase::ReplaceOld, now_epoch_s());

        self.warehouse
            .drop_old_table(table)
            .await
            .map_err(|err| CreationError::DropOldTableError {
                table: table.name.clone(),
                message: err.to_string(),
            })?;
        timestamps.log(Phase::DropOld, now_epoch_s());

        if table.stores_snapshots() {
            self.warehouse
                .make_snapshot(table)
                .await
                .map_err(|err| CreationError::HistoryTableCreationError {
                    table: table.name.clone(),
                    message: err.to_string(),
                })?;
            timestamps.log(Phase::MakeSnapshot, now_epoch_s());
        }

        let duration = timestamps.duration().unwrap_or(0.0);
        self.store
            .update_last_created(&table.name, now_epoch_s(), duration)
            .await
            .map_err(|err| store_error(table, err))?;
        self.store
            .log_timestamps(&table.name, timestamps)
            .await
            .map_err(|err| store_error(table, err))?;

        Ok(())
    }

    async fn notify_creation_error(&self, err: &CreationError) {
        let title = err.table_name().to_string();
        if let Err(notify_err) = self.notifier.notify(&title, &err.to_string(), NotifyClass::Failure).await {
            tracing::error!(error = %notify_err, "notifier: failed to deliver creation error");
        }
    }
}

fn store_error<E: std::error::Error>(table: &Table, err: E) -> CreationError {
    CreationError::TableCreationError {
        table: table.name.clone(),
        message: err.to_string(),
    }
}
