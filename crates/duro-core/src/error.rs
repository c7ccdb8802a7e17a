//! Error taxonomy for the duro engine.
//!
//! Two roots, matching the propagation policy: [`SchedulerError`] aborts a
//! reschedule pass; [`CreationError`] is caught at the tree-walker boundary
//! and the walk continues with the remaining tables.

use thiserror::Error;

/// Structural errors that abort a reschedule pass (§7, "Scheduler errors").
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("dependency graph is not a DAG; cycles: {0:?}")]
    NotADAG(Vec<Vec<String>>),

    #[error("roots without an interval: {0:?}")]
    RootsWithoutInterval(Vec<String>),

    #[error("{0}")]
    TablesWithoutRequiredFiles(String),

    #[error("git error: {0}")]
    GitError(String),

    #[error("config field error: {0}")]
    ConfigFieldError(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-table errors raised while creating/materializing a single view
/// (§7, "Creation errors"). Caught at the `create_tree` boundary.
#[derive(Debug, Error, Clone)]
pub enum CreationError {
    #[error("table not found in schedule store: {0}")]
    TableNotFoundInDB(String),

    #[error("table not found in dependency graph: {0}")]
    TableNotFoundInGraph(String),

    #[error("failed to create table {table}: {message}")]
    TableCreationError { table: String, message: String },

    #[error("processor not found for table: {0}")]
    ProcessorNotFound(String),

    #[error("processor run failed for {table}: {output}")]
    ProcessorRunError { table: String, output: String },

    #[error("COPY into {table} failed: {message}")]
    RedshiftCopyError { table: String, message: String },

    #[error("could not connect to warehouse: {0}")]
    RedshiftConnectionError(String),

    #[error("tests failed for {table}: {failed_columns:?}")]
    TestsFailedError {
        table: String,
        failed_columns: Vec<String>,
    },

    #[error("materialization of {table} exceeded deadline of {deadline_s}s")]
    QueryTimeoutError { table: String, deadline_s: f64 },

    #[error("failed to drop old table for {table}: {message}")]
    DropOldTableError { table: String, message: String },

    #[error("failed to create history table for {table}: {message}")]
    HistoryTableCreationError { table: String, message: String },
}

impl CreationError {
    /// The table this error is about, used as the notifier title per §7
    /// (every creation error's notifier title is the table name, except
    /// `RedshiftConnectionError` whose title is the message itself).
    pub fn table_name(&self) -> &str {
        match self {
            CreationError::TableNotFoundInDB(t) => t,
            CreationError::TableNotFoundInGraph(t) => t,
            CreationError::TableCreationError { table, .. } => table,
            CreationError::ProcessorNotFound(t) => t,
            CreationError::ProcessorRunError { table, .. } => table,
            CreationError::RedshiftCopyError { table, .. } => table,
            CreationError::RedshiftConnectionError(msg) => msg,
            CreationError::TestsFailedError { table, .. } => table,
            CreationError::QueryTimeoutError { table, .. } => table,
            CreationError::DropOldTableError { table, .. } => table,
            CreationError::HistoryTableCreationError { table, .. } => table,
        }
    }

    /// Whether this variant should use its own message as the notifier
    /// title rather than the table name (§4.I, §7).
    pub fn is_connection_error(&self) -> bool {
        matches!(self, CreationError::RedshiftConnectionError(_))
    }
}

/// Result alias for scheduler-entry operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Result alias for per-table creation operations.
pub type CreationResult<T> = std::result::Result<T, CreationError>;
