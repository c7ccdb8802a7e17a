//! Processor pipeline (spec §4.H): extract, stage, transform, upload, load.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use duro_core::table::Table;
use duro_core::traits::{ProcessorRunner, WarehouseConn};
use tokio::process::Command;

use crate::error::ProcessorError;
use crate::objectstore::ObjectStore;
use crate::sandbox::Sandbox;

/// Drives the processor pipeline against a warehouse `W`. Holds the
/// per-table processor script text and per-schema `requirements.txt`
/// contents, neither of which live in the schedule store (spec §3).
pub struct DuroProcessorRunner<W> {
    warehouse: Arc<W>,
    object_store: ObjectStore,
    sandboxes_root: PathBuf,
    scripts: Arc<BTreeMap<String, String>>,
    requirements: Arc<BTreeMap<String, String>>,
}

impl<W> DuroProcessorRunner<W> {
    pub fn new(
        warehouse: Arc<W>,
        object_store: ObjectStore,
        sandboxes_root: PathBuf,
        scripts: Arc<BTreeMap<String, String>>,
        requirements: Arc<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            warehouse,
            object_store,
            sandboxes_root,
            scripts,
            requirements,
        }
    }

    fn requirements_for(&self, table_name: &str) -> Option<&str> {
        let schema = table_name.split('.').next()?;
        self.requirements.get(schema).map(String::as_str)
    }
}

#[async_trait]
impl<W> ProcessorRunner for DuroProcessorRunner<W>
where
    W: WarehouseConn + Send + Sync + 'static,
{
    type Error = ProcessorError;

    async fn run(&self, table: &Table, load_ddl: &str) -> Result<(), Self::Error> {
        let script = self
            .scripts
            .get(&table.name)
            .ok_or_else(|| ProcessorError::MissingScript(table.name.clone()))?;

        let csv_bytes = self
            .warehouse
            .extract_to_csv(&table.select_query)
            .await
            .map_err(|err| ProcessorError::Warehouse(err.to_string()))?;

        let sandbox = Sandbox::prepare(
            &self.sandboxes_root,
            &table.name,
            self.requirements_for(&table.name),
        )
        .await;

        let now = chrono::Utc::now();
        let stamp = now.format("%Y-%m-%d-%H-%M");
        let input_path = sandbox.dir.join(format!("input-{stamp}.csv"));
        let output_path = sandbox.dir.join(format!("output-{stamp}.csv"));
        let script_path = sandbox.dir.join("processor.py");

        tokio::fs::write(&input_path, &csv_bytes).await?;
        tokio::fs::write(&script_path, script).await?;

        let output = Command::new("python3")
            .arg(&script_path)
            .arg(&input_path)
            .arg(&output_path)
            .current_dir(&sandbox.dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let _ = tokio::fs::remove_file(&input_path).await;
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(ProcessorError::NonZeroExit {
                table: table.name.clone(),
                output: combined,
            });
        }

        let output_bytes = tokio::fs::read(&output_path).await?;
        let key = ObjectStore::object_key(&table.name, now);
        let url = self.object_store.put(&key, output_bytes).await?;

        let load_result = self
            .warehouse
            .load_processor_output(table, load_ddl, &url)
            .await
            .map_err(|err| ProcessorError::Warehouse(err.to_string()));

        let _ = tokio::fs::remove_file(&input_path).await;
        let _ = tokio::fs::remove_file(&output_path).await;

        load_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_are_looked_up_by_schema() {
        let mut requirements = BTreeMap::new();
        requirements.insert("reporting".to_string(), "pandas==2.0.0\n".to_string());
        let runner = DuroProcessorRunner {
            warehouse: Arc::new(()),
            object_store: ObjectStore::new("https://objects.example.com".to_string()),
            sandboxes_root: PathBuf::from("/tmp/duro-sandboxes"),
            scripts: Arc::new(BTreeMap::new()),
            requirements: Arc::new(requirements),
        };

        assert_eq!(
            runner.requirements_for("reporting.orders"),
            Some("pandas==2.0.0\n")
        );
        assert_eq!(runner.requirements_for("other.orders"), None);
    }
}
