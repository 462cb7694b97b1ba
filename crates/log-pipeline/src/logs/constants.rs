// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Well-known ports, labels, field names and limits.

/// Port the relay listens on for collector connections.
pub const DEFAULT_RELAY_PORT: u16 = 5044;

/// Port of the index store's HTTP API.
pub const DEFAULT_INDEX_PORT: u16 = 9200;

/// Time-partitioned indices are named `<prefix>-YYYY.MM.DD`.
pub const DEFAULT_INDEX_PREFIX: &str = "logstash";

/// Owners must carry this label set to `"true"` to be admitted.
pub const ADMISSION_LABEL: &str = "collect_logs_with_filebeat";

/// Owners carrying this label set to `"true"` have their message decoded as JSON.
pub const DECODE_TRIGGER_LABEL: &str = "decode_log_event_to_json_object";

pub const DEFAULT_LABEL_VALUE: &str = "true";

/// Default location of the container runtime's capture files.
pub const DEFAULT_CAPTURE_DIR: &str = "/var/lib/docker/containers";

/// Capture files are `<dir>/<owner_id>/<owner_id><suffix>`.
pub const CAPTURE_FILE_SUFFIX: &str = "-json.log";

/// Per-container runtime configuration, next to the capture file.
pub const CONTAINER_CONFIG_FILE: &str = "config.v2.json";

pub const CONFIG_FILE_NAME: &str = "log-pipeline.yaml";

// Document fields written by the pipeline itself
pub const TIMESTAMP_FIELD: &str = "@timestamp";
pub const VERSION_FIELD: &str = "@version";
pub const MESSAGE_FIELD: &str = "message";
pub const STREAM_FIELD: &str = "stream";
pub const OWNER_FIELD: &str = "owner";
pub const TAGS_FIELD: &str = "tags";

// Correlation fields
pub const TRACE_ID_FIELD: &str = "traceId";
pub const SPAN_ID_FIELD: &str = "spanId";
pub const PARENT_ID_FIELD: &str = "parentId";
pub const SPAN_EXPORTABLE_FIELD: &str = "spanExportable";

/// Maximum uncompressed size of one collector batch frame in bytes.
pub const MAX_CONTENT_SIZE_BYTES: usize = 5 * 1_024 * 1_024;

/// Capture lines longer than this are truncated before parsing.
pub const MAX_LINE_SIZE_BYTES: usize = 1_024 * 1_024;

/// Maximum number of events per collector batch and documents per bulk request.
pub const MAX_BATCH_ENTRIES_SIZE: usize = 1000;

/// Events the collector keeps while the relay is unavailable.
pub const DEFAULT_SPOOL_CAPACITY: usize = 50_000;

/// Documents the relay keeps while the index store is unavailable.
pub const DEFAULT_RELAY_QUEUE_CAPACITY: usize = 10_000;

/// Attempts made to flush the spool once shutdown has been requested.
pub const SHUTDOWN_FLUSH_ATTEMPTS: usize = 3;

/// Largest frame the relay accepts; a full batch plus JSON framing overhead.
pub const MAX_FRAME_SIZE_BYTES: usize = 2 * MAX_CONTENT_SIZE_BYTES;
