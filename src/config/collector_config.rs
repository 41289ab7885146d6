use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::collectors::driver::DriverLimits;
use crate::constants::{
    DEFAULT_CACHE_FOLDER, DEFAULT_LOG_FILE, DEFAULT_OUTPUT_FOLDER, DEFAULT_TOKEN_ENV_VAR, MAX_EVENTS, MAX_PAGES,
    MAX_RETRY, MAX_RETRY_DELAY_SECS, RETRY_BASE_DELAY_SECS,
};

/// Paging and retry bounds as written in the config file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_pages: usize,
    pub max_retry: usize,
    pub retry_delay_secs: u64,
    pub event_milestone: usize,
}

impl LimitsConfig {
    /// Reject bounds the driver cannot page or retry with
    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            bail!("limits.max_pages must be at least 1");
        }
        if self.max_retry == 0 || self.max_retry > u32::MAX as usize {
            bail!("limits.max_retry must be between 1 and {}", u32::MAX);
        }
        if self.retry_delay_secs > MAX_RETRY_DELAY_SECS {
            bail!(
                "limits.retry_delay_secs is {}, the maximum is {}",
                self.retry_delay_secs,
                MAX_RETRY_DELAY_SECS
            );
        }
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_pages: MAX_PAGES,
            max_retry: MAX_RETRY,
            retry_delay_secs: RETRY_BASE_DELAY_SECS,
            event_milestone: MAX_EVENTS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CollectorConfig {
    /// Folder receiving the JSON artifacts
    pub output_folder: PathBuf,
    /// Running text log of the collection
    pub log_file: PathBuf,
    /// Folder for the user/group/mailbox caches
    pub cache_folder: PathBuf,
    /// Environment variable holding the bearer token
    pub token_env_var: String,
    pub limits: LimitsConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            cache_folder: PathBuf::from(DEFAULT_CACHE_FOLDER),
            token_env_var: DEFAULT_TOKEN_ENV_VAR.to_string(),
            limits: LimitsConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CollectorConfig = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
        config
            .limits
            .validate()
            .with_context(|| format!("Invalid limits in {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, yaml).with_context(|| format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Write the default configuration to `path`
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        CollectorConfig::default().save_to_yaml_file(path)
    }

    /// Limits handed to every collection driver of the run
    pub fn driver_limits(&self) -> DriverLimits {
        DriverLimits {
            max_pages: self.limits.max_pages,
            max_retry: self.limits.max_retry,
            retry_delay: Duration::from_secs(self.limits.retry_delay_secs),
            event_milestone: self.limits.event_milestone,
        }
    }

    /// Apply `--output` / `--log-file` overrides from the command line
    pub fn with_overrides(mut self, output: Option<&Path>, log_file: Option<&Path>) -> Self {
        if let Some(output) = output {
            self.output_folder = output.to_path_buf();
        }
        if let Some(log_file) = log_file {
            self.log_file = log_file.to_path_buf();
        }
        self
    }
}

/// Load the configuration at `config_path`, or the defaults without one.
///
/// A path that does not exist yet gets the default configuration written to it.
pub fn load_or_create_config(config_path: Option<&Path>) -> Result<CollectorConfig> {
    match config_path {
        Some(path) if path.exists() => CollectorConfig::from_yaml_file(path),
        Some(path) => {
            info!("Creating default config at {}", path.display());
            let default_config = CollectorConfig::default();
            default_config.save_to_yaml_file(path)?;
            Ok(default_config)
        }
        None => {
            debug!("No config path provided, using default configuration");
            Ok(CollectorConfig::default())
        }
    }
}
