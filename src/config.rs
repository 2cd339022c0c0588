use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::aggregator::MAX_SANE_VALUE_LEN;

/// SQLite caps bound parameters per statement at 32766; tuples bind 7 per row.
const MAX_BATCH_SIZE: usize = 4000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    /// Rows per composed upsert statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_pool_size: default_max_pool_size(),
            batch_size: default_batch_size(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

fn default_db_path() -> String {
    "data/dns.db".into()
}

fn default_max_pool_size() -> u32 {
    4
}

fn default_batch_size() -> usize {
    200
}

fn default_busy_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Files aggregated concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Records with a query or answer longer than this are skipped.
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_value_len: default_max_value_len(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_value_len() -> usize {
    MAX_SANE_VALUE_LEN
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportConfig {
    /// Reverse query names in exported lines.
    #[serde(default)]
    pub reverse_query: bool,
}

impl AppConfig {
    /// Load from `path`, else `CONFIG_FILE`, else `config.toml`. An explicit path must exist;
    /// a missing default file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match std::env::var("CONFIG_FILE") {
                Ok(p) => (PathBuf::from(p), true),
                Err(_) => (PathBuf::from("config.toml"), false),
            },
        };
        if !explicit && !path.exists() {
            let config = AppConfig::default();
            config.validate()?;
            return Ok(config);
        }
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.batch_size > 0 && self.database.batch_size <= MAX_BATCH_SIZE,
            "database.batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE,
            self.database.batch_size
        );
        anyhow::ensure!(
            self.database.busy_timeout_secs > 0,
            "database.busy_timeout_secs must be > 0, got {}",
            self.database.busy_timeout_secs
        );
        anyhow::ensure!(
            self.aggregation.workers > 0,
            "aggregation.workers must be > 0, got {}",
            self.aggregation.workers
        );
        anyhow::ensure!(
            self.aggregation.max_value_len > 0,
            "aggregation.max_value_len must be > 0, got {}",
            self.aggregation.max_value_len
        );
        Ok(())
    }
}
