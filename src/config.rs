use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

use crate::data::migrations;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECENT_FILES: usize = 5;
const DATABASE_FILE: &str = "docvault.db";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub recent_files_limit: usize,
    pub data_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            recent_files_limit: DEFAULT_RECENT_FILES,
            data_dir: data_dir.into(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_base_url = read("DOCVAULT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let request_timeout = match read("DOCVAULT_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("DOCVAULT_TIMEOUT_SECS is not a number: {raw}"))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let recent_files_limit = match read("DOCVAULT_RECENT_FILES") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DOCVAULT_RECENT_FILES is not a number: {raw}"))?,
            None => DEFAULT_RECENT_FILES,
        };

        let data_dir = match read("DOCVAULT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => directories::ProjectDirs::from("dev", "docvault", "docvault")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .context("failed to resolve a data directory; set DOCVAULT_DATA_DIR")?,
        };

        Ok(Self {
            api_base_url,
            request_timeout,
            recent_files_limit,
            data_dir,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn open_database(&self) -> anyhow::Result<Connection> {
        open_database_at(&self.database_path())
    }
}

pub fn open_database_at(db_path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = ClientConfig::from_lookup(lookup_from(&[("DOCVAULT_DATA_DIR", "/tmp/dv")]))
            .unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.recent_files_limit, 5);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/dv/docvault.db"));
    }

    #[test]
    fn test_overrides_are_read() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("DOCVAULT_API_URL", "https://vault.example.com"),
            ("DOCVAULT_TIMEOUT_SECS", "5"),
            ("DOCVAULT_RECENT_FILES", "10"),
            ("DOCVAULT_DATA_DIR", "/var/lib/dv"),
        ]))
        .unwrap();
        assert_eq!(config.api_base_url, "https://vault.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.recent_files_limit, 10);
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            ("DOCVAULT_TIMEOUT_SECS", "soon"),
            ("DOCVAULT_DATA_DIR", "/tmp/dv"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DOCVAULT_TIMEOUT_SECS"));
    }

    #[test]
    fn test_open_database_creates_parent_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(DEFAULT_API_URL, dir.path().join("nested"));

        let conn = config.open_database().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'dashboard_cache'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert!(config.database_path().exists());
    }
}
