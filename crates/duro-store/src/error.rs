//! Error type for the SQLite-backed schedule store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("table not found in schedule store: {0}")]
    TableNotFound(String),

    #[error("invalid config json for {table}: {source}")]
    InvalidConfig {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("background task panicked: {0}")]
    TaskJoin(String),
}
