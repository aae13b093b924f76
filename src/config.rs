//! Settings for the snapview driver
//!
//! Loaded from a TOML file named by `--config` or `SNAPVIEW_CONFIG`, then
//! overridden from the environment. Keep the file outside any workspace
//! root: a file there would itself be a swipe candidate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RetryPolicy;
use crate::workspace::default_identity_file;

pub const CONFIG_ENV: &str = "SNAPVIEW_CONFIG";
pub const CLEARTOOL_ENV: &str = "SNAPVIEW_CLEARTOOL";
pub const IDENTITY_FILE_ENV: &str = "SNAPVIEW_IDENTITY_FILE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// cleartool program to run
    pub executable: PathBuf,

    /// Identity file at the workspace root
    pub identity_file: String,

    /// Directory for the rolling log file, if any
    pub log_dir: Option<PathBuf>,

    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("cleartool"),
            identity_file: default_identity_file().to_string(),
            log_dir: None,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "retry.backoff_multiplier must be a number of at least 1.0, got {}",
                self.backoff_multiplier
            );
        }
        if self.max_delay_ms < self.initial_delay_ms {
            anyhow::bail!(
                "retry.max_delay_ms ({}) is below retry.initial_delay_ms ({})",
                self.max_delay_ms,
                self.initial_delay_ms
            );
        }
        Ok(())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl Settings {
    /// Load settings: `.env`, then the file, then environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut settings = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(executable) = std::env::var(CLEARTOOL_ENV) {
            settings.executable = PathBuf::from(executable);
        }
        if let Ok(identity_file) = std::env::var(IDENTITY_FILE_ENV) {
            settings.identity_file = identity_file;
        }

        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.retry.validate()?;
        Ok(settings)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}
