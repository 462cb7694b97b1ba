// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! The structured record services emit, one JSON object per line.
//!
//! ```json
//! {"@timestamp":"2026-10-17T10:00:00.123+02:00","@version":"1","message":"Fetched user",
//!  "logger_name":"com.example.UserController","thread_name":"http-nio-8080-exec-1",
//!  "level":"INFO","level_value":20000,"app_name":"user-service",
//!  "traceId":"abc123","spanId":"def456","spanExportable":"false"}
//! ```
//!
//! `level_value` is always derived from `level`: it is written on encode and
//! ignored on decode. The correlation fields are all-or-nothing; see
//! [`CorrelationState`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::logs::constants::{
    MESSAGE_FIELD, PARENT_ID_FIELD, SPAN_EXPORTABLE_FIELD, SPAN_ID_FIELD, TIMESTAMP_FIELD,
    TRACE_ID_FIELD, VERSION_FIELD,
};

pub const LEVEL_FIELD: &str = "level";
pub const LEVEL_VALUE_FIELD: &str = "level_value";
pub const LOGGER_NAME_FIELD: &str = "logger_name";
pub const THREAD_NAME_FIELD: &str = "thread_name";
pub const APP_NAME_FIELD: &str = "app_name";

/// Current record shape.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("record field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Severity, ordered `TRACE < DEBUG < INFO < WARN < ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Numeric projection written as `level_value`.
    #[must_use]
    pub fn value(self) -> u32 {
        match self {
            Level::Trace => 5_000,
            Level::Debug => 10_000,
            Level::Info => 20_000,
            Level::Warn => 30_000,
            Level::Error => 40_000,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            _ => Err(RecordError::InvalidField {
                field: LEVEL_FIELD,
                reason: format!("unknown level '{s}'"),
            }),
        }
    }
}

/// Trace identity linking records across services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub trace_id: String,
    pub span_id: String,
    /// Absent for the root span.
    pub parent_id: Option<String>,
    /// Carried as `"true"`/`"false"` on the wire.
    pub exportable: bool,
}

impl Correlation {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    fn write_into(&self, doc: &mut Map<String, Value>) {
        doc.insert(TRACE_ID_FIELD.to_string(), Value::from(self.trace_id.clone()));
        doc.insert(SPAN_ID_FIELD.to_string(), Value::from(self.span_id.clone()));
        if let Some(parent_id) = &self.parent_id {
            doc.insert(PARENT_ID_FIELD.to_string(), Value::from(parent_id.clone()));
        }
        doc.insert(
            SPAN_EXPORTABLE_FIELD.to_string(),
            Value::from(self.exportable.to_string()),
        );
    }
}

/// What a document says about its trace identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationState {
    Complete(Correlation),
    /// No correlation field at all.
    Absent,
    /// Some correlation fields, but not a non-empty `traceId` and `spanId`.
    Partial,
}

const CORRELATION_FIELDS: [&str; 4] = [
    TRACE_ID_FIELD,
    SPAN_ID_FIELD,
    PARENT_ID_FIELD,
    SPAN_EXPORTABLE_FIELD,
];

fn non_empty_str<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    doc.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Interprets `spanExportable`: the string `"true"` (any case) or a JSON
/// `true` is true, anything else is false.
#[must_use]
pub fn exportable_from(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

/// Inspects the correlation fields of a document without changing them.
#[must_use]
pub fn correlation_state(doc: &Map<String, Value>) -> CorrelationState {
    if !CORRELATION_FIELDS.iter().any(|f| doc.contains_key(*f)) {
        return CorrelationState::Absent;
    }
    match (
        non_empty_str(doc, TRACE_ID_FIELD),
        non_empty_str(doc, SPAN_ID_FIELD),
    ) {
        (Some(trace_id), Some(span_id)) => CorrelationState::Complete(Correlation {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_id: non_empty_str(doc, PARENT_ID_FIELD).map(str::to_string),
            exportable: exportable_from(doc.get(SPAN_EXPORTABLE_FIELD)),
        }),
        _ => CorrelationState::Partial,
    }
}

/// True when the document carries a `level_value` that does not match its
/// `level`. A document without either field is not a mismatch.
#[must_use]
pub fn level_mismatch(doc: &Map<String, Value>) -> bool {
    let Some(level) = doc
        .get(LEVEL_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| Level::from_str(s).ok())
    else {
        return false;
    };
    match doc.get(LEVEL_VALUE_FIELD) {
        None => false,
        Some(Value::Number(n)) => n.as_u64() != Some(u64::from(level.value())),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok() != Some(u64::from(level.value())),
        Some(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub schema_version: u32,
    pub message: String,
    pub level: Level,
    pub logger_origin: String,
    pub thread_origin: String,
    pub application_name: String,
    pub correlation: Option<Correlation>,
    pub extra_fields: Map<String, Value>,
}

impl LogRecord {
    /// Encodes the record as the JSON object written to stdout.
    ///
    /// Extra fields never override the record's own keys.
    #[must_use]
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::from(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false)),
        );
        doc.insert(
            VERSION_FIELD.to_string(),
            Value::from(self.schema_version.to_string()),
        );
        doc.insert(MESSAGE_FIELD.to_string(), Value::from(self.message.clone()));
        doc.insert(
            LOGGER_NAME_FIELD.to_string(),
            Value::from(self.logger_origin.clone()),
        );
        doc.insert(
            THREAD_NAME_FIELD.to_string(),
            Value::from(self.thread_origin.clone()),
        );
        doc.insert(LEVEL_FIELD.to_string(), Value::from(self.level.as_str()));
        doc.insert(LEVEL_VALUE_FIELD.to_string(), Value::from(self.level.value()));
        doc.insert(
            APP_NAME_FIELD.to_string(),
            Value::from(self.application_name.clone()),
        );
        if let Some(correlation) = &self.correlation {
            correlation.write_into(&mut doc);
        }
        for (key, value) in &self.extra_fields {
            if !doc.contains_key(key) {
                doc.insert(key.clone(), value.clone());
            }
        }
        doc
    }

    /// Serializes to a single JSON line (without the trailing newline).
    #[must_use]
    pub fn to_json_line(&self) -> String {
        Value::Object(self.to_document()).to_string()
    }

    /// Decodes a record from its JSON object.
    ///
    /// A partial correlation is not an error here: the typed view has no
    /// correlation and the partial fields stay in `extra_fields`.
    pub fn from_document(doc: &Map<String, Value>) -> Result<Self, RecordError> {
        let timestamp = doc
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .ok_or(RecordError::MissingField(TIMESTAMP_FIELD))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s).map_err(|e| RecordError::InvalidField {
                    field: TIMESTAMP_FIELD,
                    reason: e.to_string(),
                })
            })?;

        let schema_version = match doc.get(VERSION_FIELD) {
            None => SCHEMA_VERSION,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| RecordError::InvalidField {
                    field: VERSION_FIELD,
                    reason: format!("{n} is not a schema version"),
                })?,
            Some(Value::String(s)) => {
                s.trim()
                    .parse::<u32>()
                    .map_err(|e| RecordError::InvalidField {
                        field: VERSION_FIELD,
                        reason: e.to_string(),
                    })?
            }
            Some(other) => {
                return Err(RecordError::InvalidField {
                    field: VERSION_FIELD,
                    reason: format!("{other} is not a schema version"),
                })
            }
        };

        let message = doc
            .get(MESSAGE_FIELD)
            .and_then(Value::as_str)
            .ok_or(RecordError::MissingField(MESSAGE_FIELD))?
            .to_string();

        let level = doc
            .get(LEVEL_FIELD)
            .and_then(Value::as_str)
            .ok_or(RecordError::MissingField(LEVEL_FIELD))
            .and_then(Level::from_str)?;

        let text = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let correlation = match correlation_state(doc) {
            CorrelationState::Complete(correlation) => Some(correlation),
            CorrelationState::Absent | CorrelationState::Partial => None,
        };

        let mut extra_fields = Map::new();
        for (key, value) in doc {
            let known = matches!(
                key.as_str(),
                TIMESTAMP_FIELD
                    | VERSION_FIELD
                    | MESSAGE_FIELD
                    | LEVEL_FIELD
                    | LEVEL_VALUE_FIELD
                    | LOGGER_NAME_FIELD
                    | THREAD_NAME_FIELD
                    | APP_NAME_FIELD
            );
            let consumed_correlation =
                correlation.is_some() && CORRELATION_FIELDS.contains(&key.as_str());
            if !known && !consumed_correlation {
                extra_fields.insert(key.clone(), value.clone());
            }
        }

        Ok(LogRecord {
            timestamp,
            schema_version,
            message,
            level,
            logger_origin: text(LOGGER_NAME_FIELD),
            thread_origin: text(THREAD_NAME_FIELD),
            application_name: text(APP_NAME_FIELD),
            correlation,
            extra_fields,
        })
    }

    pub fn from_json_line(line: &str) -> Result<Self, RecordError> {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(doc)) => Self::from_document(&doc),
            _ => Err(RecordError::NotAnObject),
        }
    }
}
