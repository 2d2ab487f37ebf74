//! Controller configuration
//!
//! Read from the YAML file named by `CONTROLLERS_CONFIG`. Every field has a
//! default, so an absent file or an empty document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{Error, Result};

/// Environment variable naming the YAML configuration file
pub const CONFIG_PATH_ENV: &str = "CONTROLLERS_CONFIG";

/// Environment variable overriding `taskTTL` (humantime format, e.g. `12h`)
pub const TASK_TTL_ENV: &str = "TASK_TTL";

const DEFAULT_TASK_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// How long a completed task is retained before it deletes itself
    #[serde(rename = "taskTTL", with = "humantime_serde")]
    pub task_ttl: Duration,

    pub cf_process_defaults: ProcessDefaults,

    /// Entry point prepended to every task command
    pub launcher_path: String,

    pub lease_name: String,

    pub health_port: u16,
}

/// Quota stamped onto tasks at initialization
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessDefaults {
    #[serde(rename = "memoryMB")]
    pub memory_mb: i64,

    #[serde(rename = "diskQuotaMB")]
    pub disk_quota_mb: i64,
}

impl Default for ProcessDefaults {
    fn default() -> Self {
        Self {
            memory_mb: 1024,
            disk_quota_mb: 1024,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            task_ttl: DEFAULT_TASK_TTL,
            cf_process_defaults: ProcessDefaults::default(),
            launcher_path: "/cnb/lifecycle/launcher".to_string(),
            lease_name: "cf-controllers-leader".to_string(),
            health_port: 8080,
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| Error::InvalidConfig(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Load from `CONTROLLERS_CONFIG` (defaults when unset) and apply `TASK_TTL`
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        if let Ok(ttl) = std::env::var(TASK_TTL_ENV) {
            config.apply_task_ttl(&ttl)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_task_ttl(&mut self, value: &str) -> Result<()> {
        self.task_ttl = humantime_serde::re::humantime::parse_duration(value)
            .map_err(|e| Error::InvalidConfig(format!("{}={:?}: {}", TASK_TTL_ENV, value, e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_ttl.is_zero() {
            return Err(Error::InvalidConfig("taskTTL must be positive".to_string()));
        }
        if self.cf_process_defaults.memory_mb <= 0 {
            return Err(Error::InvalidConfig(
                "cfProcessDefaults.memoryMB must be positive".to_string(),
            ));
        }
        if self.cf_process_defaults.disk_quota_mb <= 0 {
            return Err(Error::InvalidConfig(
                "cfProcessDefaults.diskQuotaMB must be positive".to_string(),
            ));
        }
        if self.launcher_path.is_empty() {
            return Err(Error::InvalidConfig("launcherPath must be set".to_string()));
        }
        Ok(())
    }
}
