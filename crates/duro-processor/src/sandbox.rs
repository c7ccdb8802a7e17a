//! Per-table processor working directory (spec §4.H step 3).
//!
//! The original builds a Python virtualenv per table from a sibling
//! `requirements.txt`. There is no general cross-language package manager
//! to shell out to here, so the sandbox is just a scratch directory with
//! the requirements file recorded alongside it for visibility; failing to
//! write it is logged, not fatal.

use std::path::{Path, PathBuf};

pub struct Sandbox {
    pub dir: PathBuf,
}

impl Sandbox {
    /// Create (or reuse) the working directory for `table_name` under
    /// `sandboxes_root`, recording `requirements` if the schema carries one.
    pub async fn prepare(sandboxes_root: &Path, table_name: &str, requirements: Option<&str>) -> Self {
        let dir = sandboxes_root.join(sanitize(table_name));

        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(table = table_name, error = %err, "sandbox: failed to create working directory");
        }

        if let Some(reqs) = requirements {
            let path = dir.join("requirements.txt");
            if let Err(err) = tokio::fs::write(&path, reqs).await {
                tracing::warn!(table = table_name, error = %err, "sandbox: failed to record requirements.txt");
            }
        }

        Self { dir }
    }
}

fn sanitize(table_name: &str) -> String {
    table_name.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_per_table_directory() {
        let root = TempDir::new().unwrap();
        let sandbox = Sandbox::prepare(root.path(), "reporting.orders", None).await;
        assert!(sandbox.dir.ends_with("reporting_orders"));
        assert!(sandbox.dir.is_dir());
    }

    #[tokio::test]
    async fn records_requirements_file_when_present() {
        let root = TempDir::new().unwrap();
        let sandbox = Sandbox::prepare(root.path(), "reporting.orders", Some("pandas==2.0.0\n")).await;
        let contents = tokio::fs::read_to_string(sandbox.dir.join("requirements.txt"))
            .await
            .unwrap();
        assert_eq!(contents, "pandas==2.0.0\n");
    }
}
