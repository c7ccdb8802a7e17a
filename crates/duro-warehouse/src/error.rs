//! Error type for the Postgres-wire-protocol warehouse driver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    Driver(#[from] postgres::Error),

    #[error("warehouse worker task panicked: {0}")]
    TaskJoin(String),

    #[error("could not connect to warehouse: {0}")]
    Connection(String),
}
