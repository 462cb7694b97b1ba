// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration Module
//!
//! This module handles all configuration for the collector and the relay,
//! including parsing from YAML files and environment variables and providing
//! sensible defaults.
//!
//! ## Configuration Priority
//!
//! Configuration sources are applied in the order they are added to the
//! [`ConfigBuilder`] (later sources override earlier):
//!
//! 1. **Defaults** - Hard-coded defaults in [`Config::default`]
//! 2. **YAML file** - `log-pipeline.yaml` (if present)
//! 3. **Environment variables** - `LP_*` (highest priority)
//!
//! ## Edge Cases and Behaviors
//!
//! - **Durations** are given in milliseconds (`poll_interval_ms: 250`); zero
//!   falls back to the default where a zero interval would spin.
//! - **Index URL** without a scheme gets `http://` prepended.
//! - **Processor chains** that fail to parse make the whole source fail and
//!   [`ConfigBuilder::build`] returns the error: a half-applied chain could
//!   drop the admission filter.
//! - **Missing YAML file** is not an error; the source is simply empty.

pub mod env;
pub mod log_level;
pub mod processor;
pub mod yaml;

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_aux::prelude::deserialize_bool_from_anything;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::{
    env::EnvConfigSource,
    log_level::LogLevel,
    processor::{default_collector_processors, ProcessorConfig, ProcessorKind},
    yaml::YamlConfigSource,
};
use crate::logs::constants;

/// Helper macro to merge `Option<T>` fields to `T` fields when `Option<T>` is `Some`
///
/// Providing one field argument will merge the value from the source config field into the config
/// field.
///
/// Providing two field arguments will merge the value from the source config field into the config
/// field when the source differs in name or nesting.
#[macro_export]
macro_rules! merge_option_to_value {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field = value.clone();
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field = value.clone();
        }
    };
}

/// Helper macro to merge `Option<String>` fields into `String` fields, ignoring
/// values that are empty after trimming.
#[macro_export]
macro_rules! merge_string {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                $config.$config_field = trimmed.to_string();
            }
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                $config.$field = trimmed.to_string();
            }
        }
    };
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("invalid processor #{position} ({kind}): {reason}")]
    InvalidProcessor {
        position: usize,
        kind: String,
        reason: String,
    },
}

pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Applies every source in order, normalizes the result and validates it.
    ///
    /// The first source that fails to load aborts the build: a configuration
    /// that only partially applied is not something the pipeline should run
    /// with.
    pub fn build(mut self) -> Result<Config, ConfigError> {
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("Failed to load config: {}", e);
                return Err(e);
            }
        }

        if self.sources.is_empty() {
            debug!("No configuration sources, using default config.");
        }

        self.config.index_url = normalize_url(&self.config.index_url);
        if self.config.collector_processors.is_none() {
            self.config.collector_processors = Some(default_collector_processors());
        }

        self.config.validate()?;
        Ok(self.config)
    }
}

/// Normalize a URL by ensuring it has a protocol.
///
/// If the URL doesn't start with http:// or https://, adds http:// (the index
/// store usually lives on the local network).
fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');

    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    pub log_level: LogLevel,

    // Collector: capture discovery and tailing
    pub collector_capture_dir: PathBuf,
    pub collector_capture_file_suffix: String,
    pub collector_containers_dir: Option<PathBuf>,
    pub collector_tail_from_end: bool,
    pub collector_poll_interval: Duration,
    pub collector_rescan_interval: Duration,
    pub collector_max_line_bytes: usize,
    pub collector_worker_queue_size: usize,

    // Collector: owner metadata resolution
    pub collector_metadata_wait: Duration,
    pub collector_metadata_retry_interval: Duration,

    // Collector: processor chain (None until the builder fills in the default)
    pub collector_processors: Option<Vec<ProcessorConfig>>,

    // Collector: transport to the relay
    pub collector_relay_addr: String,
    pub collector_spool_capacity: usize,
    pub collector_batch_max_events: usize,
    pub collector_batch_max_bytes: usize,
    pub collector_flush_interval: Duration,
    pub collector_ack_timeout: Duration,
    pub collector_backoff_base: Duration,
    pub collector_backoff_max: Duration,
    pub collector_shutdown_attempts: usize,
    pub collector_compression_level: i32,

    // Relay
    pub relay_listen_addr: String,
    pub relay_max_connections: usize,
    pub relay_queue_capacity: usize,
    pub relay_processors: Vec<ProcessorConfig>,

    // Index store
    pub index_url: String,
    pub index_prefix: String,
    pub index_bulk_max_docs: usize,
    pub index_flush_interval: Duration,
    pub index_timeout: Duration,
    pub index_backoff_base: Duration,
    pub index_backoff_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),

            collector_capture_dir: PathBuf::from(constants::DEFAULT_CAPTURE_DIR),
            collector_capture_file_suffix: constants::CAPTURE_FILE_SUFFIX.to_string(),
            collector_containers_dir: None,
            collector_tail_from_end: false,
            collector_poll_interval: Duration::from_millis(250),
            collector_rescan_interval: Duration::from_secs(10),
            collector_max_line_bytes: constants::MAX_LINE_SIZE_BYTES,
            collector_worker_queue_size: 1_000,

            collector_metadata_wait: Duration::from_secs(2),
            collector_metadata_retry_interval: Duration::from_millis(100),

            collector_processors: None,

            collector_relay_addr: format!("127.0.0.1:{}", constants::DEFAULT_RELAY_PORT),
            collector_spool_capacity: constants::DEFAULT_SPOOL_CAPACITY,
            collector_batch_max_events: constants::MAX_BATCH_ENTRIES_SIZE,
            collector_batch_max_bytes: constants::MAX_CONTENT_SIZE_BYTES,
            collector_flush_interval: Duration::from_secs(1),
            collector_ack_timeout: Duration::from_secs(30),
            collector_backoff_base: Duration::from_millis(100),
            collector_backoff_max: Duration::from_secs(30),
            collector_shutdown_attempts: constants::SHUTDOWN_FLUSH_ATTEMPTS,
            collector_compression_level: 0,

            relay_listen_addr: format!("0.0.0.0:{}", constants::DEFAULT_RELAY_PORT),
            relay_max_connections: 256,
            relay_queue_capacity: constants::DEFAULT_RELAY_QUEUE_CAPACITY,
            relay_processors: Vec::new(),

            index_url: format!("http://localhost:{}", constants::DEFAULT_INDEX_PORT),
            index_prefix: constants::DEFAULT_INDEX_PREFIX.to_string(),
            index_bulk_max_docs: constants::MAX_BATCH_ENTRIES_SIZE,
            index_flush_interval: Duration::from_secs(1),
            index_timeout: Duration::from_secs(10),
            index_backoff_base: Duration::from_millis(100),
            index_backoff_max: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Checks values that cannot be fixed up silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector_capture_file_suffix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "collector.capture_file_suffix",
                reason: "must not be empty".to_string(),
            });
        }
        validate_host_port("collector.relay_addr", &self.collector_relay_addr)?;
        self.relay_listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "relay.listen_addr",
                reason: e.to_string(),
            })?;
        if !(self.index_url.starts_with("http://") || self.index_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "index.url",
                reason: format!("'{}' is not an http(s) URL", self.index_url),
            });
        }
        if self.index_prefix.trim().is_empty() || self.index_prefix.contains('*') {
            return Err(ConfigError::InvalidValue {
                field: "index.prefix",
                reason: "must be a non-empty name without wildcards".to_string(),
            });
        }
        for (field, value) in [
            ("collector.batch_max_events", self.collector_batch_max_events),
            ("collector.batch_max_bytes", self.collector_batch_max_bytes),
            ("collector.max_line_bytes", self.collector_max_line_bytes),
            ("collector.worker_queue_size", self.collector_worker_queue_size),
            ("relay.max_connections", self.relay_max_connections),
            ("index.bulk_max_docs", self.index_bulk_max_docs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.collector_batch_max_bytes > constants::MAX_CONTENT_SIZE_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "collector.batch_max_bytes",
                reason: format!(
                    "must not exceed {} bytes",
                    constants::MAX_CONTENT_SIZE_BYTES
                ),
            });
        }
        if !(0..=22).contains(&self.collector_compression_level) {
            return Err(ConfigError::InvalidValue {
                field: "collector.compression_level",
                reason: "must be between 0 (disabled) and 22".to_string(),
            });
        }
        ensure_admission(&self.collector_chain())
    }

    /// The collector chain, falling back to the default chain.
    #[must_use]
    pub fn collector_chain(&self) -> Vec<ProcessorConfig> {
        self.collector_processors
            .clone()
            .unwrap_or_else(default_collector_processors)
    }
}

/// Owners are only collected when they opt in, whatever the chain looks
/// like, so a collector chain without a `label_filter` is refused.
pub fn ensure_admission(chain: &[ProcessorConfig]) -> Result<(), ConfigError> {
    if chain
        .iter()
        .any(|p| p.kind() == ProcessorKind::LabelFilter)
    {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: "collector.processors",
            reason: "must contain a label_filter".to_string(),
        })
    }
}

fn validate_host_port(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let Some((host, port)) = value.rsplit_once(':') else {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("'{value}' is missing a port"),
        });
    };
    if host.is_empty() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("'{value}' is missing a host"),
        });
    }
    port.parse::<u16>()
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidValue {
            field,
            reason: format!("invalid port '{port}': {e}"),
        })
}

/// Load configuration from a YAML file in `config_directory` and the
/// environment, in that priority order.
pub fn get_config(config_directory: &Path) -> Result<Config, ConfigError> {
    let path: PathBuf = config_directory.join(constants::CONFIG_FILE_NAME);
    ConfigBuilder::default()
        .add_source(Box::new(YamlConfigSource { path }))
        .add_source(Box::new(EnvConfigSource))
        .build()
}

pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => {
            error!(
                "Failed to parse value, expected a string, got: {}, ignoring",
                other
            );
            Ok(None)
        }
    }
}

pub fn deserialize_optional_bool_from_anything<'de, D>(
    deserializer: D,
) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Option::deserialize(deserializer)?;

    match opt {
        None => Ok(None),
        Some(value) => match deserialize_bool_from_anything(value) {
            Ok(bool_result) => Ok(Some(bool_result)),
            Err(e) => {
                error!("Failed to parse bool value: {}, ignoring", e);
                Ok(None)
            }
        },
    }
}

/// Deserializes a value that may arrive as a number or as a numeric string
/// (environment variables are always strings). Unparsable values are ignored.
pub fn deserialize_option_lossless<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + serde::de::DeserializeOwned,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    let Some(value) = value else {
        return Ok(None);
    };
    let parsed = match &value {
        Value::String(s) => s.trim().parse::<T>().ok(),
        other => serde_json::from_value::<T>(other.clone()).ok(),
    };
    if parsed.is_none() {
        error!("Failed to parse numeric value: {}, ignoring", value);
    }
    Ok(parsed)
}

/// Deserializes a millisecond count into a `Duration`. Zero and negative
/// values are ignored so an interval can never become a busy loop.
pub fn deserialize_optional_duration_from_millis<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    struct DurationVisitor;
    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Option<Duration>;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a duration in milliseconds (integer or numeric string)")
        }
        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
            if v == 0 {
                error!("Duration of 0 ms is not allowed, ignoring");
                return Ok(None);
            }
            Ok(Some(Duration::from_millis(v)))
        }
        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
            match u64::try_from(v) {
                Ok(v) => self.visit_u64(v),
                Err(_) => {
                    error!("Negative duration {} ms is not allowed, ignoring", v);
                    Ok(None)
                }
            }
        }
        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
            match v.trim().parse::<u64>() {
                Ok(ms) => self.visit_u64(ms),
                Err(e) => {
                    error!("Failed to parse duration '{}': {}, ignoring", v, e);
                    Ok(None)
                }
            }
        }
        fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }
    deserializer.deserialize_any(DurationVisitor)
}
