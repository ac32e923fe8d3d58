pub mod schema;

pub use schema::{Config, LimitConfig, LogConfig, StorageBackend, StorageConfig};

use anyhow::{Context, Result};
use std::path::Path;

use crate::activity::ActivityLimit;
use crate::error::{GuardError, GuardResult};

impl Config {
    /// Read, parse and validate a config file. `.json` files use the legacy
    /// JSON layout, everything else is TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Config = if is_json {
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot start with.
    pub fn validate(&self) -> GuardResult<()> {
        self.message_limit()?;
        self.join_limit()?;
        if self.storage.backend == StorageBackend::Sqlite && self.storage.path.is_none() {
            return Err(GuardError::Config(
                "storage.backend = \"sqlite\" requires storage.path".into(),
            ));
        }
        Ok(())
    }

    pub fn message_limit(&self) -> GuardResult<ActivityLimit> {
        self.message_limit.to_limit().map_err(|e| in_section("message_limit", e))
    }

    pub fn join_limit(&self) -> GuardResult<ActivityLimit> {
        self.join_limit.to_limit().map_err(|e| in_section("join_limit", e))
    }
}

fn in_section(section: &str, err: GuardError) -> GuardError {
    match err {
        GuardError::Config(msg) => GuardError::Config(format!("{section}: {msg}")),
        other => other,
    }
}
