//! Capability interfaces the tree walker drives (Design Notes: a narrow,
//! explicit trait per external system rather than one monolithic client).
//!
//! Each implementing crate (`duro-store`, `duro-warehouse`,
//! `duro-processor`, `duro-notify`) owns its own error type; `duro-core`
//! never names a concrete one.

use async_trait::async_trait;

use crate::table::Table;
use crate::timestamps::Timestamps;

/// The embedded schedule store: tracks every table's run history,
/// in-flight state, and timing statistics (spec §6).
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert new tables and refresh the config/select-query/interval of
    /// existing ones, without touching their run history (spec §4.K).
    /// Tables present before this call but absent from `tables` are
    /// stamped `deleted_ts` and cleared of `started`/`waiting`/`force`.
    async fn upsert_tables(&self, tables: &[Table]) -> Result<UpsertSummary, Self::Error>;

    /// Tables due to be (re)created right now: stale by their own interval
    /// and not already running or waiting (spec §4.H).
    async fn tables_to_create(&self) -> Result<Vec<Table>, Self::Error>;

    async fn load_table_details(&self, name: &str) -> Result<Option<Table>, Self::Error>;

    /// Mark `name` as started at `now`. Mutually exclusive with waiting.
    async fn log_start(&self, name: &str, now: i64) -> Result<(), Self::Error>;

    async fn reset_start(&self, name: &str) -> Result<(), Self::Error>;

    /// Clear every in-flight `started_ts`/`waiting_ts` (spec §4.J: run at
    /// boot, since no rebuild can have survived a process restart).
    async fn reset_all_starts(&self) -> Result<(), Self::Error>;

    /// Mark `name` as waiting on its dependencies, or clear the mark when
    /// `now` is `None`.
    async fn mark_waiting(&self, name: &str, now: Option<i64>) -> Result<(), Self::Error>;

    /// Seconds since `name` started running, or `None` if it is not
    /// currently running (`started_ts` absent).
    async fn get_time_running(&self, name: &str, now: i64) -> Result<Option<i64>, Self::Error>;

    /// Seconds since `name` began waiting on its children, or `None` if it
    /// is not currently waiting (`waiting_ts` absent).
    async fn get_time_waiting(&self, name: &str, now: i64) -> Result<Option<i64>, Self::Error>;

    /// Record a successful rebuild: stamps `last_created_ts`, folds
    /// `duration_s` into the running mean, and increments `times_run`.
    async fn update_last_created(
        &self,
        name: &str,
        now: i64,
        duration_s: f64,
    ) -> Result<(), Self::Error>;

    async fn get_average_completion_time(&self, name: &str) -> Result<Option<f64>, Self::Error>;

    async fn log_timestamps(&self, name: &str, timestamps: &Timestamps) -> Result<(), Self::Error>;

    /// The most recently processed commit hash, if a reschedule has ever
    /// been driven from a git checkout (spec §3, "Commit log").
    async fn last_processed_commit(&self) -> Result<Option<String>, Self::Error>;

    /// Append `hash` to the commit log as processed at `now`.
    async fn record_processed_commit(&self, hash: &str, now: i64) -> Result<(), Self::Error>;
}

/// Which tables changed shape during an `upsert_tables` call, for the
/// reschedule summary notification (spec §4.K).
#[derive(Debug, Clone, Default)]
pub struct UpsertSummary {
    pub inserted: Vec<String>,
    pub changed: Vec<String>,
    pub deleted: Vec<String>,
}

/// The single column each row a test query checks must equal zero for the
/// test to pass (spec §4.G.4).
pub struct TestOutcome {
    pub column: String,
    pub passed: bool,
}

/// The analytical warehouse a table is materialized into (spec §4.G).
#[async_trait]
pub trait WarehouseConn: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run `table`'s select query into its temp-suffixed table.
    async fn create_temp_table(&self, table: &Table) -> Result<(), Self::Error>;

    /// Run `query` and render the result set as the processor pipeline's
    /// CSV dialect (semicolon delimiter, backslash escape, header row)
    /// (spec §4.H step 2).
    async fn extract_to_csv(&self, query: &str) -> Result<Vec<u8>, Self::Error>;

    /// Run every test query against the temp table, one outcome per query.
    /// Test query text lives on disk alongside the view, not in the
    /// schedule store, so the caller supplies it (spec §3: the Table
    /// entity itself carries no test queries).
    async fn run_tests(&self, table: &Table, test_queries: &[String]) -> Result<Vec<TestOutcome>, Self::Error>;

    /// Atomically swap the temp table into place: rename the current table
    /// aside to its old-suffixed name, rename temp into the live name, and
    /// recreate any dependent views the old table carried (spec §4.G.5).
    async fn replace_old_table(&self, table: &Table) -> Result<(), Self::Error>;

    async fn drop_old_table(&self, table: &Table) -> Result<(), Self::Error>;

    /// Append the current contents of `table` to its history table
    /// (spec §4.G.5, only called when `table.stores_snapshots()`).
    async fn make_snapshot(&self, table: &Table) -> Result<(), Self::Error>;

    /// Load a processor's uploaded CSV into `table`'s temp-suffixed table
    /// (spec §4.H steps 5-6): drop any existing temp table, run `load_ddl`
    /// rewritten onto the temp name, grant select, then bulk-load
    /// `object_store_url` and commit immediately.
    async fn load_processor_output(
        &self,
        table: &Table,
        load_ddl: &str,
        object_store_url: &str,
    ) -> Result<(), Self::Error>;
}

/// A `.py` processor: pulls the select query's result set through an
/// external transform and lands it back in the warehouse (spec §4.G.3).
#[async_trait]
pub trait ProcessorRunner: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run the processor pipeline for `table`, leaving the result loaded
    /// into `table`'s temp-suffixed table. `load_ddl` is the processor's
    /// sibling `.sql` file, which names the table schema the processor's
    /// CSV output is loaded into; it lives on disk, not in the schedule
    /// store (spec §3, §4.H step 5).
    async fn run(&self, table: &Table, load_ddl: &str) -> Result<(), Self::Error>;
}

/// Severity class of a notification (spec §6: `class ∈ {success, failure, log}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyClass {
    Success,
    Failure,
    Log,
}

/// Outbound alerting (spec §4.M): duplicate suppression is the
/// implementation's concern, not the caller's.
#[async_trait]
pub trait Notifier: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn notify(&self, title: &str, text: &str, class: NotifyClass) -> Result<(), Self::Error>;
}
