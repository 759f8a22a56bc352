//! Configuration module for duramq.
//!
//! Loads a structured TOML file into strongly-typed structs (`Config`,
//! `StoreConfig`, `QueueConfig`) using `serde` + `toml`.
//!
//! # Example `duramq.toml`
//! ```toml
//! [store]
//! driver = "sqlite"
//! source = "./data/queue.db"
//!
//! [queue]
//! batch_size           = 10
//! max_batch_cache_size = 5
//! expire_time_ms       = 604_800_000  # 168h
//! clean_interval_ms    = 3_600_000    # 1h
//! write_timeout_ms     = 100
//! delete_timeout_ms    = 500
//! ```
//!
//! The queue `name` is never read from the file; the broker assigns it per
//! session with [`QueueConfig::named`].

use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Sqlite,
    Rocksdb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub driver: Driver,
    /// Database file (sqlite) or directory (rocksdb).
    pub source: String,
}

/// Per-queue tuning. `batch_size` doubles as the capacity of the ingress,
/// egress and deletion channels.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Bucket namespace identifier, assigned per session.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_batch_cache_size")]
    pub max_batch_cache_size: usize,
    #[serde(default = "default_expire_time_ms")]
    pub expire_time_ms: u64,
    #[serde(default = "default_clean_interval_ms")]
    pub clean_interval_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_delete_timeout_ms")]
    pub delete_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_max_batch_cache_size() -> usize {
    5
}

fn default_expire_time_ms() -> u64 {
    168 * 60 * 60 * 1000
}

fn default_clean_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_write_timeout_ms() -> u64 {
    100
}

fn default_delete_timeout_ms() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            name: String::new(),
            batch_size: default_batch_size(),
            max_batch_cache_size: default_max_batch_cache_size(),
            expire_time_ms: default_expire_time_ms(),
            clean_interval_ms: default_clean_interval_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            delete_timeout_ms: default_delete_timeout_ms(),
        }
    }
}

impl QueueConfig {
    /// Defaults with the given bucket name.
    pub fn named(name: impl Into<String>) -> Self {
        QueueConfig {
            name: name.into(),
            ..QueueConfig::default()
        }
    }

    pub fn expire_time(&self) -> Duration {
        Duration::from_millis(self.expire_time_ms)
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_millis(self.clean_interval_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_millis(self.delete_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    /// Queue tuning applied to every session queue. If omitted in TOML,
    /// defaults will be applied.
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Load configuration from a TOML file into `Config`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&raw)?;
    Ok(cfg)
}
