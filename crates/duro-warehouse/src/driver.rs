//! Warehouse driver (spec §4.G): emits SQL, not code. Holds one
//! connection and funnels every call through `spawn_blocking`, since the
//! underlying `postgres` client is synchronous.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duro_core::table::Table;
use duro_core::traits::{TestOutcome, WarehouseConn};
use postgres::{Client, Config, NoTls};

use crate::catalog::{rewrite_definition, DEPENDENT_VIEWS_QUERY};
use crate::error::WarehouseError;

/// Connection parameters for the analytical warehouse (spec §6).
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl WarehouseConfig {
    fn to_postgres_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user)
            .password(&self.password);
        config
    }
}

pub struct WarehouseDriver {
    client: Arc<Mutex<Client>>,
}

impl WarehouseDriver {
    pub fn connect(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let client = config
            .to_postgres_config()
            .connect(NoTls)
            .map_err(|err| WarehouseError::Connection(err.to_string()))?;
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    async fn with_client<F, T>(&self, f: F) -> Result<T, WarehouseError>
    where
        F: FnOnce(&mut Client) -> Result<T, postgres::Error> + Send + 'static,
        T: Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = client.lock().expect("warehouse connection mutex poisoned");
            f(&mut guard)
        })
        .await
        .map_err(|err| WarehouseError::TaskJoin(err.to_string()))?
        .map_err(WarehouseError::from)
    }

    fn create_table_ddl(table: &Table) -> String {
        let temp = table.temp_name();
        let mut ddl = format!("CREATE TABLE {temp} ");
        if let Some(style) = table.diststyle() {
            ddl.push_str(&format!("DISTSTYLE {style} "));
        }
        if let Some(key) = table.distkey() {
            ddl.push_str(&format!("DISTKEY({key}) "));
        }
        if let Some(key) = table.sortkey() {
            ddl.push_str(&format!("SORTKEY({key}) "));
        }
        ddl.push_str(&format!("AS ({})", table.select_query));
        ddl
    }
}

#[async_trait]
impl WarehouseConn for WarehouseDriver {
    type Error = WarehouseError;

    async fn create_temp_table(&self, table: &Table) -> Result<(), Self::Error> {
        let temp = table.temp_name();
        let create_ddl = Self::create_table_ddl(table);
        let grantees = table.grant_select().map(|s| s.to_string());

        self.with_client(move |client| {
            client.batch_execute(&format!("DROP TABLE IF EXISTS {temp};"))?;
            client.batch_execute(&create_ddl)?;
            if let Some(grantees) = grantees {
                if !grantees.is_empty() {
                    client.batch_execute(&format!("GRANT SELECT ON {temp} TO {grantees};"))?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn run_tests(&self, table: &Table, test_queries: &[String]) -> Result<Vec<TestOutcome>, Self::Error> {
        if test_queries.is_empty() {
            return Ok(Vec::new());
        }

        let queries = test_queries.to_vec();
        let table_name = table.name.clone();
        self.with_client(move |client| {
            let mut outcomes = Vec::with_capacity(queries.len());
            for (idx, query) in queries.iter().enumerate() {
                let row = client.query_one(query.as_str(), &[])?;
                let passed: bool = row.get(0);
                outcomes.push((idx, passed));
            }
            Ok(outcomes)
        })
        .await
        .map(|raw| {
            raw.into_iter()
                .map(|(idx, passed)| TestOutcome {
                    column: format!("{table_name}#{idx}"),
                    passed,
                })
                .collect()
        })
    }

    async fn replace_old_table(&self, table: &Table) -> Result<(), Self::Error> {
        let (schema, short_name) = table
            .schema_and_table()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .ok_or_else(|| WarehouseError::Connection(format!("invalid table name: {}", table.name)))?;
        let name = table.name.clone();
        let temp = table.temp_name();
        let old = table.old_name();
        let old_short = format!("{short_name}_duro_old");
        let temp_suffix = duro_core::table::TEMP_SUFFIX.to_string();

        self.with_client(move |client| {
            let _ = client.batch_execute(&format!("DROP VIEW IF EXISTS {name};"));

            let rows = client.query(DEPENDENT_VIEWS_QUERY, &[&schema, &short_name])?;
            for row in rows {
                let view_schema: String = row.get(0);
                let view_name: String = row.get(1);
                let definition: String = row.get(2);
                let rewritten = rewrite_definition(&definition, &schema, &short_name, &temp_suffix);
                client.batch_execute(&format!(
                    "CREATE OR REPLACE VIEW {view_schema}.{view_name} AS {rewritten};"
                ))?;
            }

            client.batch_execute(&format!(
                "DROP TABLE IF EXISTS {old};
                 CREATE TABLE IF NOT EXISTS {name} (id int);
                 ALTER TABLE {name} RENAME TO {old_short};
                 ALTER TABLE {temp} RENAME TO {short_name};"
            ))?;
            Ok(())
        })
        .await
    }

    async fn drop_old_table(&self, table: &Table) -> Result<(), Self::Error> {
        let old = table.old_name();
        self.with_client(move |client| client.batch_execute(&format!("DROP TABLE IF EXISTS {old};")))
            .await
    }

    async fn make_snapshot(&self, table: &Table) -> Result<(), Self::Error> {
        let name = table.name.clone();
        let history = table.history_name();
        let interval_mins: i64 = table
            .snapshots_interval_mins()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let stored_for_mins: i64 = table
            .snapshots_stored_for_mins()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        self.with_client(move |client| {
            let bounds = client
                .query_opt(
                    &format!("SELECT max(snapshot_timestamp), min(snapshot_timestamp) FROM {history}"),
                    &[],
                )
                .ok()
                .flatten();

            let (max_ts, min_ts): (Option<chrono::NaiveDateTime>, Option<chrono::NaiveDateTime>) = match bounds {
                Some(row) => (row.get(0), row.get(1)),
                None => (None, None),
            };

            match max_ts {
                None => {
                    client.batch_execute(&format!(
                        "CREATE TABLE {history} AS (SELECT *, current_timestamp AS snapshot_timestamp FROM {name} LIMIT 1);
                         TRUNCATE {history};
                         INSERT INTO {history} SELECT *, current_timestamp FROM {name};"
                    ))?;
                }
                Some(max_ts) => {
                    let now = chrono::Utc::now().naive_utc();
                    let age_mins = (now - max_ts).num_minutes();
                    if age_mins > interval_mins {
                        client.batch_execute(&format!(
                            "INSERT INTO {history} SELECT *, current_timestamp FROM {name};"
                        ))?;
                    } else if let Some(min_ts) = min_ts {
                        let min_age_mins = (now - min_ts).num_minutes();
                        if min_age_mins > stored_for_mins {
                            client.batch_execute(&format!(
                                "DELETE FROM {history} WHERE datediff('mins', snapshot_timestamp, current_timestamp) > {stored_for_mins};"
                            ))?;
                        }
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn extract_to_csv(&self, query: &str) -> Result<Vec<u8>, Self::Error> {
        let query = query.to_string();
        self.with_client(move |client| {
            let stmt = client.prepare(&query)?;
            let column_names: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
            let rows = client.query(&stmt, &[])?;
            Ok(crate::csv_export::rows_to_csv(&column_names, &rows))
        })
        .await
    }

    async fn load_processor_output(
        &self,
        table: &Table,
        load_ddl: &str,
        object_store_url: &str,
    ) -> Result<(), Self::Error> {
        let (schema, short_name) = table
            .schema_and_table()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .ok_or_else(|| WarehouseError::Connection(format!("invalid table name: {}", table.name)))?;
        let temp = table.temp_name();
        let temp_suffix = duro_core::table::TEMP_SUFFIX.to_string();
        let rewritten_ddl = rewrite_definition(load_ddl, &schema, &short_name, &temp_suffix);
        let grantees = table.grant_select().map(|s| s.to_string());
        let url = object_store_url.to_string();

        self.with_client(move |client| {
            client.batch_execute(&format!("DROP TABLE IF EXISTS {temp};"))?;
            client.batch_execute(&rewritten_ddl)?;
            if let Some(grantees) = grantees {
                if !grantees.is_empty() {
                    client.batch_execute(&format!("GRANT SELECT ON {temp} TO {grantees};"))?;
                }
            }
            client.batch_execute(&format!("COPY {temp} FROM '{url}' CREDENTIALS '' FORMAT CSV DELIMITER ';' ESCAPE;"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_table() -> Table {
        let mut config = BTreeMap::new();
        config.insert("distkey".to_string(), "id".to_string());
        Table {
            name: "reporting.orders".into(),
            select_query: "select 1".into(),
            interval_mins: Some(60),
            config,
            last_created_ts: None,
            mean_duration_s: None,
            times_run: 0,
            started_ts: None,
            waiting_ts: None,
            force: false,
            deleted_ts: None,
        }
    }

    #[test]
    fn create_table_ddl_includes_distkey() {
        let ddl = WarehouseDriver::create_table_ddl(&sample_table());
        assert!(ddl.contains("DISTKEY(id)"));
        assert!(ddl.contains("reporting.orders_duro_temp"));
    }
}
