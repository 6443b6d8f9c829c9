//! Bootstrap configuration loading and config file resolution
//!
//! The TOML file is optional. Every field is optional so that a partial file
//! only overrides what it names; command-line flags and environment variables
//! are layered on top by the service binary.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bootstrap configuration loaded from TOML file
///
/// Read once at startup. The producer must restart to pick up changes.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    /// Upstream API endpoint polled every cycle
    #[serde(default)]
    pub api_url: Option<String>,

    /// Per-request timeout for the upstream API (seconds)
    #[serde(default)]
    pub api_timeout_secs: Option<u64>,

    /// Normal pause between cycles (seconds)
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,

    /// Consecutive failed cycles before the extended pause
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Extended pause after `max_retries` failures (seconds)
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,

    /// Maximum records per sink submission
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Port for the liveness endpoint
    #[serde(default)]
    pub health_port: Option<u16>,

    /// Region tag added to every enriched record
    #[serde(default)]
    pub region: Option<String>,

    /// Record profile and enrichment labels
    #[serde(default)]
    pub records: RecordsConfig,

    /// Streaming ingestion sink (disabled when absent)
    #[serde(default)]
    pub stream: Option<StreamConfig>,

    /// Object-store sink (disabled when absent)
    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[records]` table
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RecordsConfig {
    /// Built-in record profile name ("crm" or "web")
    #[serde(default)]
    pub profile: Option<String>,

    /// Override for the profile's minimum count of required fields
    #[serde(default)]
    pub min_required_fields: Option<usize>,

    /// Provenance label written to `source`
    #[serde(default)]
    pub source_label: Option<String>,

    /// Pipeline label written to `pipeline`
    #[serde(default)]
    pub pipeline_label: Option<String>,
}

/// `[stream]` table
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StreamConfig {
    /// Delivery stream name
    #[serde(default)]
    pub name: Option<String>,

    /// Ingestion gateway URL accepting PutRecordBatch bodies
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// `[object_store]` table
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ObjectStoreConfig {
    /// Root directory of the local object store
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Key prefix for batch objects
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Locate the bootstrap config file
///
/// Priority order:
/// 1. Explicit path (command line or `SNAPFEED_CONFIG`)
/// 2. `~/.config/snapfeed/producer.toml`
/// 3. `/etc/snapfeed/producer.toml`
///
/// An explicit path is returned even if it does not exist so the caller can
/// report it. Returns `None` when no default location exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("snapfeed").join("producer.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/snapfeed/producer.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load the bootstrap configuration with graceful degradation
///
/// A missing file logs a warning and yields defaults. A file that exists but
/// does not parse is a configuration error.
pub fn load_bootstrap_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(explicit) else {
        info!("No config file found, using command line, environment and defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config file {}", path.display());
            Ok(config)
        }
        Err(Error::TomlParse(e)) => Err(Error::Config(format!(
            "Failed to parse {}: {}",
            path.display(),
            e
        ))),
        Err(e) => Err(e),
    }
}
