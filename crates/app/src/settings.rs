//! Process configuration, read from `settings.toml`.
//!
//! Durable runtime facts (feature toggles, ruleset version) live in the
//! database instead; this file only covers what the process needs before
//! the database is open.

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub enum Database {
    #[serde(rename = "memory")]
    Memory,
    #[serde(untagged)]
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

#[derive(Debug, Deserialize)]
pub struct Ledger {
    pub base_url: String,
    #[serde(default = "default_ledger_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between records of a sync batch, milliseconds.
    #[serde(default = "default_sync_delay_ms")]
    pub sync_delay_ms: u64,
}

fn default_ledger_timeout_secs() -> u64 {
    10
}

fn default_sync_delay_ms() -> u64 {
    100
}

#[derive(Debug, Default, Deserialize)]
pub struct Engine {
    pub group_window_secs: Option<i64>,
    pub fingerprint_bucket_secs: Option<i64>,
    #[serde(default)]
    pub ai_enabled: bool,
    pub ai_timeout_secs: Option<u64>,
    pub default_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Ingest {
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            workers: default_workers(),
        }
    }
}

fn default_queue_size() -> usize {
    256
}

fn default_workers() -> usize {
    2
}

#[derive(Debug, Deserialize)]
pub struct Processor {
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
}

impl Default for Processor {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
        }
    }
}

fn default_sync_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Server,
    pub ledger: Ledger,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub ingest: Ingest,
    #[serde(default)]
    pub processor: Processor,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings"))
            .build()?;

        settings.try_deserialize()
    }
}
