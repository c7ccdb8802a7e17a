//! SQLite-backed implementation of [`duro_core::traits::ScheduleStore`]
//! (spec §4.E, §6: "embedded relational database, single file").

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use duro_core::table::Table;
use duro_core::timestamps::Timestamps;
use duro_core::traits::{ScheduleStore, UpsertSummary};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::migrations;

/// Single-writer, single-file schedule store.
pub struct SqliteScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScheduleStore {
    /// Open (creating if absent) the database at `path`, applying any
    /// pending migrations before returning.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn row_to_table(row: &rusqlite::Row) -> rusqlite::Result<Table> {
    let config_json: String = row.get("config")?;
    let config: BTreeMap<String, String> = serde_json::from_str(&config_json).unwrap_or_default();
    let force: i64 = row.get("force")?;

    Ok(Table {
        name: row.get("table_name")?,
        select_query: row.get("query")?,
        interval_mins: row.get("interval")?,
        config,
        last_created_ts: row.get("last_created")?,
        mean_duration_s: row.get("mean")?,
        times_run: row.get("times_run")?,
        started_ts: row.get("started")?,
        waiting_ts: row.get("waiting")?,
        force: force != 0,
        deleted_ts: row.get("deleted")?,
    })
}

const TABLE_COLUMNS: &str = "table_name, query, interval, config, last_created, mean, times_run, force, started, deleted, waiting";

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    type Error = StoreError;

    async fn upsert_tables(&self, tables: &[Table]) -> Result<UpsertSummary, Self::Error> {
        let conn = self.conn.lock().await;
        let mut summary = UpsertSummary::default();

        let incoming: std::collections::BTreeSet<&str> =
            tables.iter().map(|t| t.name.as_str()).collect();

        {
            let mut stmt = conn.prepare("SELECT table_name FROM tables WHERE deleted IS NULL")?;
            let existing_names: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .filter_map(Result::ok)
                .collect();
            for name in existing_names {
                if !incoming.contains(name.as_str()) {
                    conn.execute(
                        "UPDATE tables SET deleted = strftime('%s','now'), started = NULL, waiting = NULL, force = 0 WHERE table_name = ?1",
                        [&name],
                    )?;
                    summary.deleted.push(name);
                }
            }
        }

        for table in tables {
            let config_json = serde_json::to_string(&table.config).map_err(|err| {
                StoreError::InvalidConfig {
                    table: table.name.clone(),
                    source: err,
                }
            })?;

            let existing: Option<(String, Option<i64>, String)> = conn
                .query_row(
                    "SELECT query, interval, config FROM tables WHERE table_name = ?1",
                    [&table.name],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            match existing {
                None => {
                    conn.execute(
                        "INSERT INTO tables (table_name, query, interval, config, force) VALUES (?1, ?2, ?3, ?4, 1)",
                        params![table.name, table.select_query, table.interval_mins, config_json],
                    )?;
                    summary.inserted.push(table.name.clone());
                }
                Some((existing_query, existing_interval, existing_config)) => {
                    let changed = existing_query != table.select_query
                        || existing_interval != table.interval_mins
                        || existing_config != config_json;
                    conn.execute(
                        "UPDATE tables SET query = ?1, interval = ?2, config = ?3, deleted = NULL, force = CASE WHEN ?4 THEN 1 ELSE force END WHERE table_name = ?5",
                        params![table.select_query, table.interval_mins, config_json, changed, table.name],
                    )?;
                    if changed {
                        summary.changed.push(table.name.clone());
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn tables_to_create(&self) -> Result<Vec<Table>, Self::Error> {
        let conn = self.conn.lock().await;
        let now = duro_core::now_epoch_s();
        let sql = format!(
            "SELECT {TABLE_COLUMNS} FROM tables
             WHERE deleted IS NULL
             AND (
                force = 1
                OR last_created IS NULL
                OR interval IS NULL
                OR (CAST((?1 - last_created) AS REAL) / 60.0) - interval > 0
             )
             ORDER BY force DESC, table_name ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([now], |row| row_to_table(row))?;
        let mut tables = Vec::new();
        for row in rows {
            tables.push(row?);
        }
        Ok(tables)
    }

    async fn load_table_details(&self, name: &str) -> Result<Option<Table>, Self::Error> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {TABLE_COLUMNS} FROM tables WHERE table_name = ?1");
        conn.query_row(&sql, [name], |row| row_to_table(row))
            .optional()
            .map_err(StoreError::from)
    }

    async fn log_start(&self, name: &str, now: i64) -> Result<(), Self::Error> {
        let conn = self.conn.lock().await;
        conn.execute("UPDATE tables SET started = ?1 WHERE table_name = ?2", params![now, name])?;
        Ok(())
    }

    async fn reset_start(&self, name: &str) -> Result<(), Self::Error> {
        let conn = self.conn.lock().await;
        conn.execute("UPDATE tables SET started = NULL WHERE table_name = ?1", [name])?;
        Ok(())
    }

    async fn reset_all_starts(&self) -> Result<(), Self::Error> {
        let conn = self.conn.lock().await;
        conn.execute("UPDATE tables SET started = NULL WHERE started IS NOT NULL", [])?;
        Ok(())
    }

    async fn mark_waiting(&self, name: &str, now: Option<i64>) -> Result<(), Self::Error> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE tables SET waiting = ?1 WHERE table_name = ?2",
            params![now, name],
        )?;
        Ok(())
    }

    async fn get_time_running(&self, name: &str, now: i64) -> Result<Option<i64>, Self::Error> {
        let conn = self.conn.lock().await;
        let started: Option<i64> = conn
            .query_row("SELECT started FROM tables WHERE table_name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        Ok(started.map(|s| now - s))
    }

    async fn get_time_waiting(&self, name: &str, now: i64) -> Result<Option<i64>, Self::Error> {
        let conn = self.conn.lock().await;
        let waiting: Option<i64> = conn
            .query_row("SELECT waiting FROM tables WHERE table_name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        Ok(waiting.map(|w| now - w))
    }

    async fn update_last_created(&self, name: &str, now: i64, duration_s: f64) -> Result<(), Self::Error> {
        let conn = self.conn.lock().await;
        let (mean, times_run): (Option<f64>, i64) = conn.query_row(
            "SELECT mean, times_run FROM tables WHERE table_name = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let new_mean = match mean {
            Some(mean) if times_run > 0 => (mean * times_run as f64 + duration_s) / (times_run as f64 + 1.0),
            _ => duration_s,
        };

        conn.execute(
            "UPDATE tables SET last_created = ?1, mean = ?2, times_run = times_run + 1,
             started = NULL, force = 0, waiting = NULL WHERE table_name = ?3",
            params![now, new_mean, name],
        )?;
        Ok(())
    }

    async fn get_average_completion_time(&self, name: &str) -> Result<Option<f64>, Self::Error> {
        let conn = self.conn.lock().await;
        let mean: Option<f64> = conn
            .query_row("SELECT mean FROM tables WHERE table_name = ?1", [name], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(mean)
    }

    async fn log_timestamps(&self, name: &str, timestamps: &Timestamps) -> Result<(), Self::Error> {
        use duro_core::timestamps::Phase;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO timestamps (
                table, start, connect, select_phase, create_temp, process, csv, s3,
                insert_phase, clean_csv, tests, replace_old, drop_old, make_snapshot, finish
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                name,
                timestamps.get(Phase::Start),
                timestamps.get(Phase::Connect),
                timestamps.get(Phase::Select),
                timestamps.get(Phase::CreateTemp),
                timestamps.get(Phase::Process),
                timestamps.get(Phase::Csv),
                timestamps.get(Phase::S3),
                timestamps.get(Phase::Insert),
                timestamps.get(Phase::CleanCsv),
                timestamps.get(Phase::Tests),
                timestamps.get(Phase::ReplaceOld),
                timestamps.get(Phase::DropOld),
                timestamps.get(Phase::MakeSnapshot),
                timestamps.get(Phase::Finish),
            ],
        )?;
        Ok(())
    }

    async fn last_processed_commit(&self) -> Result<Option<String>, Self::Error> {
        let conn = self.conn.lock().await;
        let hash: Option<String> = conn
            .query_row("SELECT hash FROM commits ORDER BY processed_ts DESC LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(hash)
    }

    async fn record_processed_commit(&self, hash: &str, now: i64) -> Result<(), Self::Error> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO commits (hash, processed_ts) VALUES (?1, ?2)",
            params![hash, now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_table(name: &str, query: &str) -> Table {
        Table {
            name: name.to_string(),
            select_query: query.to_string(),
            interval_mins: Some(60),
            config: BTreeMap::new(),
            last_created_ts: None,
            mean_duration_s: None,
            times_run: 0,
            started_ts: None,
            waiting_ts: None,
            force: false,
            deleted_ts: None,
        }
    }

    #[tokio::test]
    async fn new_table_is_inserted_and_forced() {
        let store = SqliteScheduleStore::open_in_memory().unwrap();
        let summary = store.upsert_tables(&[new_table("reporting.orders", "select 1")]).await.unwrap();
        assert_eq!(summary.inserted, vec!["reporting.orders".to_string()]);

        let loaded = store.load_table_details("reporting.orders").await.unwrap().unwrap();
        assert!(loaded.force);
    }

    #[tokio::test]
    async fn unchanged_upsert_does_not_flip_force_on_second_pass() {
        let store = SqliteScheduleStore::open_in_memory().unwrap();
        let table = new_table("reporting.orders", "select 1");
        store.upsert_tables(std::slice::from_ref(&table)).await.unwrap();
        store.reset_start("reporting.orders").await.unwrap();
        // Simulate a finished run clearing force.
        store.update_last_created("reporting.orders", 1_000, 5.0).await.unwrap();

        let summary = store.upsert_tables(std::slice::from_ref(&table)).await.unwrap();
        assert!(summary.changed.is_empty());
        assert!(summary.inserted.is_empty());
        let loaded = store.load_table_details("reporting.orders").await.unwrap().unwrap();
        assert!(!loaded.force);
    }

    #[tokio::test]
    async fn changed_query_flips_force() {
        let store = SqliteScheduleStore::open_in_memory().unwrap();
        let mut table = new_table("reporting.orders", "select 1");
        store.upsert_tables(std::slice::from_ref(&table)).await.unwrap();
        store.update_last_created("reporting.orders", 1_000, 5.0).await.unwrap();

        table.select_query = "select 2".to_string();
        let summary = store.upsert_tables(std::slice::from_ref(&table)).await.unwrap();
        assert_eq!(summary.changed, vec!["reporting.orders".to_string()]);
        let loaded = store.load_table_details("reporting.orders").await.unwrap().unwrap();
        assert!(loaded.force);
    }

    #[tokio::test]
    async fn missing_from_next_upsert_is_marked_deleted() {
        let store = SqliteScheduleStore::open_in_memory().unwrap();
        store.upsert_tables(&[new_table("reporting.orders", "select 1")]).await.unwrap();

        let summary = store.upsert_tables(&[]).await.unwrap();
        assert_eq!(summary.deleted, vec!["reporting.orders".to_string()]);

        let to_create = store.tables_to_create().await.unwrap();
        assert!(to_create.is_empty());
    }

    #[tokio::test]
    async fn mean_folds_across_successive_runs() {
        let store = SqliteScheduleStore::open_in_memory().unwrap();
        store.upsert_tables(&[new_table("reporting.orders", "select 1")]).await.unwrap();

        store.update_last_created("reporting.orders", 1_000, 10.0).await.unwrap();
        assert_eq!(store.get_average_completion_time("reporting.orders").await.unwrap(), Some(10.0));

        store.update_last_created("reporting.orders", 2_000, 20.0).await.unwrap();
        assert_eq!(store.get_average_completion_time("reporting.orders").await.unwrap(), Some(15.0));
    }

    #[tokio::test]
    async fn commit_log_round_trips() {
        let store = SqliteScheduleStore::open_in_memory().unwrap();
        assert_eq!(store.last_processed_commit().await.unwrap(), None);
        store.record_processed_commit("abc123", 1_000).await.unwrap();
        assert_eq!(store.last_processed_commit().await.unwrap(), Some("abc123".to_string()));
    }
}
