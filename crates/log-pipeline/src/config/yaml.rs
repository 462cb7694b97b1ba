// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! YAML file-based configuration.
//!
//! Settings are grouped by component:
//!
//! ```yaml
//! log_level: info
//! collector:
//!   capture_dir: /var/lib/docker/containers
//!   relay_addr: relay.internal:5044
//!   spool_capacity: 50000
//!   flush_interval_ms: 1000
//!   processors:
//!     - type: add_docker_metadata
//!     - type: label_filter
//!       label: collect_logs_with_filebeat
//! relay:
//!   listen_addr: 0.0.0.0:5044
//!   max_connections: 256
//! index:
//!   url: http://elasticsearch:9200
//!   prefix: logstash
//! ```

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
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
pub struct YamlConfig {
    pub log_level: Option<LogLevel>,
    pub collector: CollectorYaml,
    pub relay: RelayYaml,
    pub index: IndexYaml,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CollectorYaml {
    pub capture_dir: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub capture_file_suffix: Option<String>,
    pub containers_dir: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub tail_from_end: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub poll_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub rescan_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub max_line_bytes: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub worker_queue_size: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub metadata_wait_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub metadata_retry_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_processors")]
    pub processors: Option<Vec<ProcessorConfig>>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub relay_addr: Option<String>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub spool_capacity: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub batch_max_events: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub batch_max_bytes: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub flush_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub ack_timeout_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub backoff_base_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub backoff_max_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub shutdown_attempts: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub compression_level: Option<i32>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RelayYaml {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub listen_addr: Option<String>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub max_connections: Option<usize>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub queue_capacity: Option<usize>,
    #[serde(deserialize_with = "deserialize_processors")]
    pub processors: Option<Vec<ProcessorConfig>>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct IndexYaml {
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub prefix: Option<String>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub bulk_max_docs: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub flush_interval_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub timeout_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub backoff_base_ms: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_millis")]
    pub backoff_max_ms: Option<Duration>,
}

#[allow(clippy::too_many_lines)]
fn merge_config(config: &mut Config, yaml_config: &YamlConfig) {
    merge_option_to_value!(config, yaml_config, log_level);

    // Collector
    let collector = &yaml_config.collector;
    merge_option_to_value!(config, collector_capture_dir, collector, capture_dir);
    merge_string!(
        config,
        collector_capture_file_suffix,
        collector,
        capture_file_suffix
    );
    if collector.containers_dir.is_some() {
        config
            .collector_containers_dir
            .clone_from(&collector.containers_dir);
    }
    merge_option_to_value!(config, collector_tail_from_end, collector, tail_from_end);
    merge_option_to_value!(config, collector_poll_interval, collector, poll_interval_ms);
    merge_option_to_value!(
        config,
        collector_rescan_interval,
        collector,
        rescan_interval_ms
    );
    merge_option_to_value!(config, collector_max_line_bytes, collector, max_line_bytes);
    merge_option_to_value!(
        config,
        collector_worker_queue_size,
        collector,
        worker_queue_size
    );
    merge_option_to_value!(config, collector_metadata_wait, collector, metadata_wait_ms);
    merge_option_to_value!(
        config,
        collector_metadata_retry_interval,
        collector,
        metadata_retry_interval_ms
    );
    if collector.processors.is_some() {
        config
            .collector_processors
            .clone_from(&collector.processors);
    }
    merge_string!(config, collector_relay_addr, collector, relay_addr);
    merge_option_to_value!(config, collector_spool_capacity, collector, spool_capacity);
    merge_option_to_value!(
        config,
        collector_batch_max_events,
        collector,
        batch_max_events
    );
    merge_option_to_value!(config, collector_batch_max_bytes, collector, batch_max_bytes);
    merge_option_to_value!(config, collector_flush_interval, collector, flush_interval_ms);
    merge_option_to_value!(config, collector_ack_timeout, collector, ack_timeout_ms);
    merge_option_to_value!(config, collector_backoff_base, collector, backoff_base_ms);
    merge_option_to_value!(config, collector_backoff_max, collector, backoff_max_ms);
    merge_option_to_value!(
        config,
        collector_shutdown_attempts,
        collector,
        shutdown_attempts
    );
    merge_option_to_value!(
        config,
        collector_compression_level,
        collector,
        compression_level
    );

    // Relay
    let relay = &yaml_config.relay;
    merge_string!(config, relay_listen_addr, relay, listen_addr);
    merge_option_to_value!(config, relay_max_connections, relay, max_connections);
    merge_option_to_value!(config, relay_queue_capacity, relay, queue_capacity);
    merge_option_to_value!(config, relay_processors, relay, processors);

    // Index
    let index = &yaml_config.index;
    merge_string!(config, index_url, index, url);
    merge_string!(config, index_prefix, index, prefix);
    merge_option_to_value!(config, index_bulk_max_docs, index, bulk_max_docs);
    merge_option_to_value!(config, index_flush_interval, index, flush_interval_ms);
    merge_option_to_value!(config, index_timeout, index, timeout_ms);
    merge_option_to_value!(config, index_backoff_base, index, backoff_base_ms);
    merge_option_to_value!(config, index_backoff_max, index, backoff_max_ms);
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        match figment.extract::<YamlConfig>() {
            Ok(yaml_config) => merge_config(config, &yaml_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from yaml file: {e}"
                )));
            }
        }

        Ok(())
    }
}
