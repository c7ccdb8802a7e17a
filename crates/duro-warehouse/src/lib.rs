//! Warehouse driver (spec §4.G): atomic swap protocol, snapshot retention,
//! and dependent-view catalog introspection for a Postgres-wire-protocol
//! analytical store.

pub mod catalog;
pub mod csv_export;
pub mod driver;
pub mod error;

pub use driver::{WarehouseConfig, WarehouseDriver};
pub use error::WarehouseError;
