// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Processor chain descriptors.
//!
//! A processor chain is configured as an ordered list of typed descriptors.
//! Every descriptor names its kind in a `type` field; the remaining fields are
//! the kind's parameters. Descriptors are resolved into concrete processors
//! by [`crate::logs::processor::registry::ProcessorRegistry`] before the
//! pipeline starts, so a typo surfaces at startup instead of silently
//! changing what reaches the index.
//!
//! # Configuration
//!
//! - **Environment variable**: `LP_COLLECTOR_PROCESSORS='[{"type":"label_filter","label":"collect_logs_with_filebeat"}]'`
//! - **YAML config**:
//!
//! ```yaml
//! collector:
//!   processors:
//!     - type: add_docker_metadata
//!     - type: label_filter
//!       label: collect_logs_with_filebeat
//!       value: "true"
//!     - type: decode_json_fields
//!       trigger_label: decode_log_event_to_json_object
//!       source_field: message
//!       overwrite_policy: overwrite
//!     - type: validate_correlation
//!     - type: exclude_at_match
//!       name: health_checks
//!       pattern: "GET /actuator/health"
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value as JsonValue};

use crate::logs::constants::{
    ADMISSION_LABEL, DECODE_TRIGGER_LABEL, DEFAULT_LABEL_VALUE, MESSAGE_FIELD,
};

/// What happens when a decoded key already exists in the target scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Decoded values replace existing ones.
    #[default]
    Overwrite,
    /// Existing values win; colliding decoded keys are discarded.
    PreserveExisting,
}

/// A single field rename applied by `rename_fields`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FieldRename {
    pub from: String,
    pub to: String,
}

/// Registry key of a processor descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    AddDockerMetadata,
    LabelFilter,
    DecodeJsonFields,
    ValidateCorrelation,
    DropFields,
    RenameFields,
    AddFields,
    ExcludeAtMatch,
    IncludeAtMatch,
    MaskSequences,
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessorKind::AddDockerMetadata => "add_docker_metadata",
            ProcessorKind::LabelFilter => "label_filter",
            ProcessorKind::DecodeJsonFields => "decode_json_fields",
            ProcessorKind::ValidateCorrelation => "validate_correlation",
            ProcessorKind::DropFields => "drop_fields",
            ProcessorKind::RenameFields => "rename_fields",
            ProcessorKind::AddFields => "add_fields",
            ProcessorKind::ExcludeAtMatch => "exclude_at_match",
            ProcessorKind::IncludeAtMatch => "include_at_match",
            ProcessorKind::MaskSequences => "mask_sequences",
        };
        f.write_str(name)
    }
}

fn default_label_value() -> String {
    DEFAULT_LABEL_VALUE.to_string()
}

fn default_source_field() -> String {
    MESSAGE_FIELD.to_string()
}

/// A typed processor descriptor, as written in configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProcessorConfig {
    /// Enrich `owner` with the container runtime's attributes.
    AddDockerMetadata {},
    /// Admission control: keep only owners whose `label` equals `value`.
    LabelFilter {
        label: String,
        #[serde(default = "default_label_value")]
        value: String,
    },
    /// Parse `source_field` as a JSON object and merge it into `target`
    /// (document root when absent), only for owners carrying the trigger label.
    DecodeJsonFields {
        #[serde(default)]
        trigger_label: Option<String>,
        #[serde(default = "default_label_value")]
        trigger_value: String,
        #[serde(default = "default_source_field")]
        source_field: String,
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        overwrite_policy: OverwritePolicy,
    },
    /// Flag records carrying only part of the trace correlation fields.
    ValidateCorrelation {},
    DropFields {
        fields: Vec<String>,
    },
    RenameFields {
        fields: Vec<FieldRename>,
    },
    AddFields {
        #[serde(default)]
        target: Option<String>,
        fields: Map<String, JsonValue>,
    },
    /// Drop records whose message matches `pattern`.
    ExcludeAtMatch {
        name: String,
        pattern: String,
    },
    /// Drop records whose message does not match `pattern`.
    IncludeAtMatch {
        name: String,
        pattern: String,
    },
    /// Replace every match of `pattern` in the message with the placeholder.
    MaskSequences {
        name: String,
        pattern: String,
        #[serde(default)]
        replace_placeholder: Option<String>,
    },
}

impl ProcessorConfig {
    #[must_use]
    pub fn kind(&self) -> ProcessorKind {
        match self {
            ProcessorConfig::AddDockerMetadata {} => ProcessorKind::AddDockerMetadata,
            ProcessorConfig::LabelFilter { .. } => ProcessorKind::LabelFilter,
            ProcessorConfig::DecodeJsonFields { .. } => ProcessorKind::DecodeJsonFields,
            ProcessorConfig::ValidateCorrelation {} => ProcessorKind::ValidateCorrelation,
            ProcessorConfig::DropFields { .. } => ProcessorKind::DropFields,
            ProcessorConfig::RenameFields { .. } => ProcessorKind::RenameFields,
            ProcessorConfig::AddFields { .. } => ProcessorKind::AddFields,
            ProcessorConfig::ExcludeAtMatch { .. } => ProcessorKind::ExcludeAtMatch,
            ProcessorConfig::IncludeAtMatch { .. } => ProcessorKind::IncludeAtMatch,
            ProcessorConfig::MaskSequences { .. } => ProcessorKind::MaskSequences,
        }
    }
}

/// The collector chain used when none is configured: enrich, admit, decode,
/// then check correlation completeness.
#[must_use]
pub fn default_collector_processors() -> Vec<ProcessorConfig> {
    vec![
        ProcessorConfig::AddDockerMetadata {},
        ProcessorConfig::LabelFilter {
            label: ADMISSION_LABEL.to_string(),
            value: default_label_value(),
        },
        ProcessorConfig::DecodeJsonFields {
            trigger_label: Some(DECODE_TRIGGER_LABEL.to_string()),
            trigger_value: default_label_value(),
            source_field: default_source_field(),
            target: None,
            overwrite_policy: OverwritePolicy::Overwrite,
        },
        ProcessorConfig::ValidateCorrelation {},
    ]
}

/// Deserializes a processor chain from config sources.
///
/// Accepts either a JSON array (YAML files) or a string holding a JSON array
/// (environment variables). Unlike most settings, an invalid descriptor is a
/// hard error: skipping one could remove the admission filter from the chain.
pub fn deserialize_processors<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<ProcessorConfig>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<JsonValue> = Option::deserialize(deserializer)?;

    let array = match value {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::String(s)) => {
            if s.trim().is_empty() {
                return Ok(None);
            }
            serde_json::from_str::<JsonValue>(&s).map_err(|e| {
                serde::de::Error::custom(format!("processors is not valid JSON: {e}"))
            })?
        }
        Some(other) => other,
    };

    let JsonValue::Array(items) = array else {
        return Err(serde::de::Error::custom(
            "processors must be a list of processor descriptors",
        ));
    };

    let mut processors = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let processor = serde_json::from_value::<ProcessorConfig>(item).map_err(|e| {
            serde::de::Error::custom(format!("invalid processor at position {index}: {e}"))
        })?;
        processors.push(processor);
    }
    Ok(Some(processors))
}
