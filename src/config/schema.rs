use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::activity::ActivityLimit;
use crate::error::GuardResult;

/// Top-level configuration.
///
/// The upper-case aliases accept the legacy `config.json` layout
/// (`ENABLE_MESSAGE_LIMIT`, `MESSAGE_LIMIT`, `JOIN_LIMIT`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Message flood enforcement is off unless explicitly enabled.
    #[serde(default, alias = "ENABLE_MESSAGE_LIMIT")]
    pub enable_message_limit: bool,
    /// Per-author message flood limit.
    #[serde(alias = "MESSAGE_LIMIT")]
    pub message_limit: LimitConfig,
    /// Tenant-wide join raid limit.
    #[serde(alias = "JOIN_LIMIT")]
    pub join_limit: LimitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// One sliding-window limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LimitConfig {
    /// Window length in seconds; fractions allowed.
    #[serde(alias = "time_window")]
    pub window_secs: f64,
    /// Records tolerated inside the window; one more trips the limit.
    #[serde(alias = "count_limit")]
    pub threshold: u32,
}

impl LimitConfig {
    pub fn to_limit(&self) -> GuardResult<ActivityLimit> {
        ActivityLimit::from_secs_f64(self.window_secs, self.threshold)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Records live in process memory and vanish on restart.
    #[default]
    Memory,
    /// Records persist in a SQLite file.
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database file for the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
