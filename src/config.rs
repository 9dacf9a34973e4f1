//! Configuration for muster

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{AccessPolicy, WriteTier};
use crate::error::DeskError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("muster")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and this config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Identifier that is always SuperAdmin, whatever the stored role says
    #[serde(default = "default_bootstrap_identifier")]
    pub bootstrap_identifier: String,

    /// Make the first account ever registered a SuperAdmin
    #[serde(default = "default_true")]
    pub first_account_is_admin: bool,

    /// Per-operation timeout in milliseconds when the caller gives no
    /// deadline (0 = none)
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Days shown by the upcoming-calendar window
    #[serde(default = "default_calendar_window_days")]
    pub calendar_window_days: u32,

    /// Ticket categories writable below Admin tier
    /// e.g. `Events = "lead"`, `Suggestions = "member"`
    #[serde(default)]
    pub category_tiers: BTreeMap<String, WriteTier>,
}

fn default_bootstrap_identifier() -> String {
    "root@example.org".to_string()
}

fn default_true() -> bool {
    true
}

fn default_op_timeout_ms() -> u64 {
    5_000
}

/// Upper bound for the upcoming-calendar window
pub const MAX_CALENDAR_WINDOW_DAYS: u32 = 366;

fn default_calendar_window_days() -> u32 {
    14
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            bootstrap_identifier: default_bootstrap_identifier(),
            first_account_is_admin: true,
            op_timeout_ms: default_op_timeout_ms(),
            calendar_window_days: default_calendar_window_days(),
            category_tiers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DeskError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| DeskError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DeskError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| DeskError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DeskError> {
        if self.bootstrap_identifier.trim().is_empty() {
            return Err(DeskError::Config("bootstrap_identifier must not be empty".into()));
        }
        if !(1..=MAX_CALENDAR_WINDOW_DAYS).contains(&self.calendar_window_days) {
            return Err(DeskError::Config(format!(
                "calendar_window_days must be between 1 and {}",
                MAX_CALENDAR_WINDOW_DAYS
            )));
        }
        Ok(())
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("muster.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        (self.op_timeout_ms > 0).then(|| Duration::from_millis(self.op_timeout_ms))
    }

    /// Build the access policy from the category tier table
    pub fn access_policy(&self) -> AccessPolicy {
        let tiers: HashMap<String, WriteTier> = self
            .category_tiers
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        AccessPolicy::new(tiers)
    }
}
