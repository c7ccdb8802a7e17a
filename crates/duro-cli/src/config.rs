//! `config.conf` loading (spec §6): the same flat `key = value` grammar
//! `duro-core::config_merge` uses for per-view `.conf` files, grouped here
//! into `[main]`/`[warehouse]`/`[store]`/`[notifier]` sections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use duro_core::config_merge::RawConfig;

/// `[main]` defaults (spec §6).
const DEFAULT_DB: &str = "./duro.db";
const DEFAULT_VIEWS: &str = "./views";
const DEFAULT_GRAPH: &str = "dependencies.dot";
const DEFAULT_LOGS: &str = "./logs";

#[derive(Debug, Clone)]
pub struct Config {
    pub db: PathBuf,
    pub views: PathBuf,
    pub graph: PathBuf,
    pub logs: PathBuf,
    pub warehouse: WarehouseSection,
    pub store: StoreSection,
    pub notifier: NotifierSection,
}

#[derive(Debug, Clone, Default)]
pub struct WarehouseSection {
    pub host: String,
    pub port: u16,
    pub db: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct StoreSection {
    pub bucket: String,
    pub folder: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct NotifierSection {
    pub url: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub log_url: Option<String>,
}

/// Parse `[section]`-delimited INI text into one flat map per section,
/// reusing `duro_core::config_merge`'s line grammar (comments, blank
/// lines, `key = value`) but tracking which section each line falls
/// under rather than discarding the headers.
fn read_sectioned(path: &Path) -> BTreeMap<String, RawConfig> {
    let mut sections: BTreeMap<String, RawConfig> = BTreeMap::new();
    let Ok(contents) = std::fs::read_to_string(path) else {
        return sections;
    };

    let mut current = "main".to_string();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_string();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    sections
}

impl Config {
    /// Load `config.conf` from `path`, falling back to the `[main]`
    /// defaults when the file or any key is absent.
    pub fn load(path: &Path) -> Self {
        let sections = read_sectioned(path);
        let main = sections.get("main").cloned().unwrap_or_default();
        let warehouse = sections.get("warehouse").cloned().unwrap_or_default();
        let store = sections.get("store").cloned().unwrap_or_default();
        let notifier = sections.get("notifier").cloned().unwrap_or_default();

        Config {
            db: PathBuf::from(main.get("db").map(String::as_str).unwrap_or(DEFAULT_DB)),
            views: PathBuf::from(main.get("views").map(String::as_str).unwrap_or(DEFAULT_VIEWS)),
            graph: PathBuf::from(main.get("graph").map(String::as_str).unwrap_or(DEFAULT_GRAPH)),
            logs: PathBuf::from(main.get("logs").map(String::as_str).unwrap_or(DEFAULT_LOGS)),
            warehouse: WarehouseSection {
                host: warehouse.get("host").cloned().unwrap_or_default(),
                port: warehouse.get("port").and_then(|p| p.parse().ok()).unwrap_or(5439),
                db: warehouse.get("db").cloned().unwrap_or_default(),
                user: warehouse.get("user").cloned().unwrap_or_default(),
                password: warehouse.get("password").cloned().unwrap_or_default(),
            },
            store: StoreSection {
                bucket: store.get("bucket").cloned().unwrap_or_default(),
                folder: store.get("folder").cloned().unwrap_or_default(),
                base_url: store.get("base_url").cloned().unwrap_or_default(),
            },
            notifier: NotifierSection {
                url: notifier.get("url").cloned().unwrap_or_default(),
                success_url: notifier.get("success_url").cloned(),
                failure_url: notifier.get("failure_url").cloned(),
                log_url: notifier.get("log_url").cloned(),
            },
        }
    }

    /// The sandbox scratch root, a sibling of `logs` (spec §4.H supplement).
    pub fn sandboxes_root(&self) -> PathBuf {
        self.logs
            .parent()
            .unwrap_or(Path::new("."))
            .join("sandboxes")
    }

    /// The object-store base URL a processor run uploads to: the
    /// configured `base_url`, or else `bucket`/`folder` joined as a path
    /// under it.
    pub fn object_store_url(&self) -> String {
        if !self.store.base_url.is_empty() {
            return self.store.base_url.clone();
        }
        format!("https://{}.s3.amazonaws.com/{}", self.store.bucket, self.store.folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_all_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("config.conf"));
        assert_eq!(config.db, PathBuf::from(DEFAULT_DB));
        assert_eq!(config.views, PathBuf::from(DEFAULT_VIEWS));
    }

    #[test]
    fn sections_are_grouped_by_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.conf");
        fs::write(
            &path,
            "[main]\ndb = /var/lib/duro.db\nviews = /srv/views\n\n[warehouse]\nhost = warehouse.internal\nport = 5432\nuser = duro\n",
        )
        .unwrap();

        let config = Config::load(&path);
        assert_eq!(config.db, PathBuf::from("/var/lib/duro.db"));
        assert_eq!(config.views, PathBuf::from("/srv/views"));
        assert_eq!(config.warehouse.host, "warehouse.internal");
        assert_eq!(config.warehouse.port, 5432);
        assert_eq!(config.warehouse.user, "duro");
    }
}
