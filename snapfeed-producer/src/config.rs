//! Producer configuration
//!
//! Settings sources, highest priority first:
//! 1. Command-line flags
//! 2. Environment variables (same setting, via clap's `env`)
//! 3. TOML bootstrap file
//! 4. Built-in defaults
//!
//! The resolved `ProducerConfig` is immutable for the life of the process.

use clap::Parser;
use snapfeed_common::config::TomlConfig;
use snapfeed_common::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::delivery::object_store::DEFAULT_PREFIX;
use crate::delivery::stream_sink::MAX_RECORDS_PER_BATCH;
use crate::delivery::{
    BatchDeliverer, DeliverySink, LocalObjectStore, ObjectStoreSink, StreamIngestSink,
};
use crate::error::SinkError;
use crate::poll_loop::LoopSettings;
use crate::profile::RecordProfile;
use crate::services::RecordEnricher;
use crate::validators::RecordValidator;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 60;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_REGION: &str = "eu-west-1";
pub const DEFAULT_PROFILE: &str = "web";

/// Command-line arguments for snapfeed-producer
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "snapfeed-producer")]
#[command(about = "Polls an HTTP API and delivers records to stream and object-store sinks")]
#[command(version)]
pub struct Args {
    /// Path to TOML bootstrap config
    #[arg(long, env = "SNAPFEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Upstream API URL
    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,

    /// Seconds between polls
    #[arg(long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Consecutive failed cycles before the extended pause
    #[arg(long, env = "MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Extended pause in seconds
    #[arg(long, env = "RETRY_DELAY")]
    pub retry_delay: Option<u64>,

    /// Maximum records per sink submission
    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Upstream request timeout in seconds
    #[arg(long, env = "API_TIMEOUT")]
    pub api_timeout: Option<u64>,

    /// Liveness endpoint port
    #[arg(long, env = "HEALTH_PORT")]
    pub health_port: Option<u16>,

    /// Region tag added to enriched records
    #[arg(long, env = "REGION")]
    pub region: Option<String>,

    /// Record profile (crm, web)
    #[arg(long, env = "RECORD_PROFILE")]
    pub profile: Option<String>,

    /// Minimum number of the profile's required fields
    #[arg(long, env = "MIN_REQUIRED_FIELDS")]
    pub min_required_fields: Option<usize>,

    /// Delivery stream name
    #[arg(long, env = "STREAM_NAME")]
    pub stream_name: Option<String>,

    /// Ingestion gateway URL for the delivery stream
    #[arg(long, env = "STREAM_ENDPOINT")]
    pub stream_endpoint: Option<String>,

    /// Root directory of the object store
    #[arg(long, env = "OBJECT_STORE_ROOT")]
    pub object_store_root: Option<PathBuf>,

    /// Key prefix for archived batches
    #[arg(long, env = "OBJECT_PREFIX")]
    pub object_prefix: Option<String>,
}

/// Resolved stream sink settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSinkSettings {
    pub name: String,
    pub endpoint: String,
}

/// Resolved object-store sink settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreSettings {
    pub root: PathBuf,
    pub prefix: String,
}

/// Fully resolved producer configuration
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub api_url: String,
    pub api_timeout: Duration,
    pub loop_settings: LoopSettings,
    pub batch_size: usize,
    pub health_port: u16,
    pub region: Option<String>,
    pub profile: RecordProfile,
    pub source_label: String,
    pub pipeline_label: String,
    pub stream_name: Option<String>,
    pub stream_endpoint: Option<String>,
    pub object_store: Option<ObjectStoreSettings>,
    pub log_level: String,
}

impl ProducerConfig {
    /// Layer arguments over the TOML file over defaults
    ///
    /// Fails only if the profile name is unknown; call [`validate`] for the
    /// remaining checks.
    ///
    /// [`validate`]: ProducerConfig::validate
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Result<Self> {
        let profile_name = args
            .profile
            .clone()
            .or_else(|| toml.records.profile.clone())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let mut profile = RecordProfile::by_name(&profile_name).ok_or_else(|| {
            Error::Config(format!(
                "Unknown record profile '{}' (expected crm or web)",
                profile_name
            ))
        })?;
        if let Some(min) = args.min_required_fields.or(toml.records.min_required_fields) {
            profile = profile.with_min_required(min);
        }

        let source_label = toml
            .records
            .source_label
            .clone()
            .unwrap_or_else(|| profile.default_source_label.clone());
        let pipeline_label = toml
            .records
            .pipeline_label
            .clone()
            .unwrap_or_else(|| profile.default_pipeline_label.clone());

        let toml_stream = toml.stream.clone().unwrap_or_default();
        let toml_store = toml.object_store.clone().unwrap_or_default();

        let object_store = args
            .object_store_root
            .clone()
            .or(toml_store.root)
            .map(|root| ObjectStoreSettings {
                root,
                prefix: args
                    .object_prefix
                    .clone()
                    .or(toml_store.prefix)
                    .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            });

        let region = args
            .region
            .clone()
            .or_else(|| toml.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Self {
            api_url: args
                .api_url
                .clone()
                .or_else(|| toml.api_url.clone())
                .unwrap_or_default(),
            api_timeout: Duration::from_secs(
                args.api_timeout
                    .or(toml.api_timeout_secs)
                    .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
            ),
            loop_settings: LoopSettings {
                poll_interval: Duration::from_secs(
                    args.poll_interval
                        .or(toml.poll_interval_secs)
                        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                ),
                max_retries: args
                    .max_retries
                    .or(toml.max_retries)
                    .unwrap_or(DEFAULT_MAX_RETRIES),
                retry_delay: Duration::from_secs(
                    args.retry_delay
                        .or(toml.retry_delay_secs)
                        .unwrap_or(DEFAULT_RETRY_DELAY_SECS),
                ),
            },
            batch_size: args
                .batch_size
                .or(toml.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            health_port: args
                .health_port
                .or(toml.health_port)
                .unwrap_or(DEFAULT_HEALTH_PORT),
            region: Some(region).filter(|r| !r.trim().is_empty()),
            profile,
            source_label,
            pipeline_label,
            stream_name: args.stream_name.clone().or(toml_stream.name),
            stream_endpoint: args.stream_endpoint.clone().or(toml_stream.endpoint),
            object_store,
            log_level: toml.logging.level.clone(),
        })
    }

    /// Reject configurations the producer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(Error::Config(
                "API URL is required (--api-url or API_URL)".to_string(),
            ));
        }
        require_http_url("API URL", &self.api_url)?;

        if self.batch_size == 0 || self.batch_size > MAX_RECORDS_PER_BATCH {
            return Err(Error::Config(format!(
                "Batch size must be between 1 and {} (got {})",
                MAX_RECORDS_PER_BATCH, self.batch_size
            )));
        }
        if self.loop_settings.max_retries == 0 {
            return Err(Error::Config("Max retries must be at least 1".to_string()));
        }
        if self.loop_settings.poll_interval.is_zero() {
            return Err(Error::Config(
                "Poll interval must be at least 1 second".to_string(),
            ));
        }
        if self.api_timeout.is_zero() {
            return Err(Error::Config(
                "API timeout must be at least 1 second".to_string(),
            ));
        }

        if self.profile.min_required == 0 {
            return Err(Error::Config(
                "Minimum required fields must be at least 1".to_string(),
            ));
        }
        let required = self.profile.required_fields.len();
        if self.profile.min_required > required {
            return Err(Error::Config(format!(
                "Minimum required fields ({}) exceeds the {} fields of profile '{}'",
                self.profile.min_required, required, self.profile.name
            )));
        }

        match (&self.stream_name, &self.stream_endpoint) {
            (Some(_), None) => {
                return Err(Error::Config(
                    "Stream name is set but no stream endpoint (STREAM_ENDPOINT)".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::Config(
                    "Stream endpoint is set but no stream name (STREAM_NAME)".to_string(),
                ))
            }
            (Some(name), Some(endpoint)) => {
                if name.trim().is_empty() {
                    return Err(Error::Config("Stream name must not be empty".to_string()));
                }
                require_http_url("Stream endpoint", endpoint)?;
            }
            (None, None) => {}
        }

        if self.stream().is_none() && self.object_store.is_none() {
            return Err(Error::Config(
                "No sink configured: set a stream (STREAM_NAME + STREAM_ENDPOINT) and/or OBJECT_STORE_ROOT"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Stream sink settings, if both name and endpoint are set
    pub fn stream(&self) -> Option<StreamSinkSettings> {
        match (&self.stream_name, &self.stream_endpoint) {
            (Some(name), Some(endpoint)) => Some(StreamSinkSettings {
                name: name.clone(),
                endpoint: endpoint.clone(),
            }),
            _ => None,
        }
    }

    /// Validator, enricher and batch size wired together
    pub fn deliverer(&self) -> BatchDeliverer {
        let validator = RecordValidator::new(self.profile.clone());
        let enricher = RecordEnricher::new(
            self.profile.clone(),
            self.source_label.clone(),
            self.pipeline_label.clone(),
        )
        .with_region(self.region.clone());
        BatchDeliverer::new(validator, enricher, self.batch_size)
    }

    /// Configured sinks, stream first
    pub fn sinks(&self) -> std::result::Result<Vec<Arc<dyn DeliverySink>>, SinkError> {
        let mut sinks: Vec<Arc<dyn DeliverySink>> = Vec::new();

        if let Some(stream) = self.stream() {
            sinks.push(Arc::new(StreamIngestSink::new(
                stream.endpoint,
                stream.name,
                self.api_timeout,
            )?));
        }
        if let Some(store) = &self.object_store {
            sinks.push(Arc::new(ObjectStoreSink::new(
                Arc::new(LocalObjectStore::new(store.root.clone())),
                store.prefix.clone(),
            )));
        }

        Ok(sinks)
    }
}

fn require_http_url(what: &str, url: &str) -> Result<()> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be an http(s) URL (got '{}')",
            what, url
        )))
    }
}
