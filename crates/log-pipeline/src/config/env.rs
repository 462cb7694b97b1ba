// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Environment variable configuration.
//!
//! Every setting can be given as an `LP_`-prefixed variable named after its
//! flattened path, e.g. `collector.relay_addr` becomes
//! `LP_COLLECTOR_RELAY_ADDR` and `index.timeout_ms` becomes
//! `LP_INDEX_TIMEOUT_MS`. Processor chains are JSON arrays:
//!
//! ```bash
//! LP_COLLECTOR_PROCESSORS='[{"type":"label_filter","label":"collect_logs_with_filebeat"}]'
//! ```

use std::path::PathBuf;
use std::time::Duration;

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_option_lossless, deserialize_optional_bool_from_anything,
        deserialize_optional_duration_from_millis, deserialize_optional_string,
        log_level::LogLevel,
        processor::{deserialize_processors, ProcessorConfig},
        Config, ConfigError, ConfigSource,
    },
    merge_option_to_value, merge_string,
};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
    /// `LP_LOG_LEVEL`
    pub log_level: Option<LogLevel>,

    /// `LP_COLLECTOR_CAPTURE_DIR`
    pub collector_capture_dir: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub collector_capture_file_suffix: Option<String>,
    /// `LP_COLLECTOR_CONTAINERS_DIR`: where runtime `config.v2.json` files live
    /// when they are not next to the capture files.
    pub collector_containers_dir: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub collector_tail_from_end: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_poll_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_rescan_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub collector_max_line_bytes: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub collector_worker_queue_size: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_metadata_wait_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_metadata_retry_interval_ms: Option<Duration>,
    /// `LP_COLLECTOR_PROCESSORS`
    #[serde(deserialize_with = "deserialize_processors")]
    pub collector_processors: Option<Vec<ProcessorConfig>>,
    /// `LP_COLLECTOR_RELAY_ADDR`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub collector_relay_addr: Option<String>,
    /// `LP_COLLECTOR_SPOOL_CAPACITY`: 0 disables spooling.
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub collector_spool_capacity: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub collector_batch_max_events: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub collector_batch_max_bytes: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_flush_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_ack_timeout_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_backoff_base_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub collector_backoff_max_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub collector_shutdown_attempts: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub collector_compression_level: Option<i32>,

    /// `LP_RELAY_LISTEN_ADDR`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub relay_listen_addr: Option<String>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub relay_max_connections: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub relay_queue_capacity: Option<usize>,
    /// `LP_RELAY_PROCESSORS`
    #[serde(deserialize_with = "deserialize_processors")]
    pub relay_processors: Option<Vec<ProcessorConfig>>,

    /// `LP_INDEX_URL`
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub index_url: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub index_prefix: Option<String>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub index_bulk_max_docs: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub index_flush_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub index_timeout_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub index_backoff_base_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub index_backoff_max_ms: Option<Duration>,
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    merge_option_to_value!(config, env_config, log_level);

    merge_option_to_value!(config, env_config, collector_capture_dir);
    merge_string!(config, env_config, collector_capture_file_suffix);
    if env_config.collector_containers_dir.is_some() {
        config
            .collector_containers_dir
            .clone_from(&env_config.collector_containers_dir);
    }
    merge_option_to_value!(config, env_config, collector_tail_from_end);
    merge_option_to_value!(
        config,
        collector_poll_interval,
        env_config,
        collector_poll_interval_ms
    );
    merge_option_to_value!(
        config,
        collector_rescan_interval,
        env_config,
        collector_rescan_interval_ms
    );
    merge_option_to_value!(config, env_config, collector_max_line_bytes);
    merge_option_to_value!(config, env_config, collector_worker_queue_size);
    merge_option_to_value!(
        config,
        collector_metadata_wait,
        env_config,
        collector_metadata_wait_ms
    );
    merge_option_to_value!(
        config,
        collector_metadata_retry_interval,
        env_config,
        collector_metadata_retry_interval_ms
    );
    if env_config.collector_processors.is_some() {
        config
            .collector_processors
            .clone_from(&env_config.collector_processors);
    }
    merge_string!(config, env_config, collector_relay_addr);
    merge_option_to_value!(config, env_config, collector_spool_capacity);
    merge_option_to_value!(config, env_config, collector_batch_max_events);
    merge_option_to_value!(config, env_config, collector_batch_max_bytes);
    merge_option_to_value!(
        config,
        collector_flush_interval,
        env_config,
        collector_flush_interval_ms
    );
    merge_option_to_value!(
        config,
        collector_ack_timeout,
        env_config,
        collector_ack_timeout_ms
    );
    merge_option_to_value!(
        config,
        collector_backoff_base,
        env_config,
        collector_backoff_base_ms
    );
    merge_option_to_value!(
        config,
        collector_backoff_max,
        env_config,
        collector_backoff_max_ms
    );
    merge_option_to_value!(config, env_config, collector_shutdown_attempts);
    merge_option_to_value!(config, env_config, collector_compression_level);

    merge_string!(config, env_config, relay_listen_addr);
    merge_option_to_value!(config, env_config, relay_max_connections);
    merge_option_to_value!(config, env_config, relay_queue_capacity);
    merge_option_to_value!(config, env_config, relay_processors);

    merge_string!(config, env_config, index_url);
    merge_string!(config, env_config, index_prefix);
    merge_option_to_value!(config, env_config, index_bulk_max_docs);
    merge_option_to_value!(
        config,
        index_flush_interval,
        env_config,
        index_flush_interval_ms
    );
    merge_option_to_value!(config, index_timeout, env_config, index_timeout_ms);
    merge_option_to_value!(
        config,
        index_backoff_base,
        env_config,
        index_backoff_base_ms
    );
    merge_option_to_value!(config, index_backoff_max, env_config, index_backoff_max_ms);
}

#[derive(Debug, PartialEq, Clone, Copy)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed("LP_"));

        match figment.extract::<EnvConfig>() {
            Ok(env_config) => merge_config(config, &env_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from environment variables: {e}"
                )));
            }
        }

        Ok(())
    }
}
