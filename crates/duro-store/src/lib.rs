//! Embedded SQLite schedule store (spec §4.E, §6).

pub mod error;
pub mod migrations;
pub mod store;

pub use error::StoreError;
pub use store::SqliteScheduleStore;
