// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! The unit flowing through a processor chain.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::logs::capture::{CaptureEnvelope, OwnerMetadata, SourceStream};
use crate::logs::constants::{
    MESSAGE_FIELD, OWNER_FIELD, STREAM_FIELD, TAGS_FIELD, TIMESTAMP_FIELD,
};

/// Data-quality flags. They travel in the document's `tags` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Marker {
    /// Owner metadata could not be resolved from the runtime.
    MetadataIncomplete,
    /// The message was expected to be JSON but did not decode to an object.
    DecodeError,
    /// Some, but not all, correlation fields are present.
    CorrelationPartial,
    /// `level_value` disagrees with `level`.
    LevelMismatch,
}

impl Marker {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Marker::MetadataIncomplete => "metadata_incomplete",
            Marker::DecodeError => "decode_error",
            Marker::CorrelationPartial => "correlation_partial",
            Marker::LevelMismatch => "level_mismatch",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marker {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata_incomplete" => Ok(Marker::MetadataIncomplete),
            "decode_error" => Ok(Marker::DecodeError),
            "correlation_partial" => Ok(Marker::CorrelationPartial),
            "level_mismatch" => Ok(Marker::LevelMismatch),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub owner: OwnerMetadata,
    pub stream: SourceStream,
    pub capture_timestamp: DateTime<Utc>,
    pub document: Map<String, Value>,
    pub markers: BTreeSet<Marker>,
}

fn owner_value(owner: &OwnerMetadata) -> Value {
    serde_json::to_value(owner).unwrap_or(Value::Null)
}

impl PipelineEvent {
    /// Builds the initial document: capture time, message text without its
    /// line terminator, stream and owner.
    #[must_use]
    pub fn from_envelope(envelope: CaptureEnvelope) -> Self {
        let mut document = Map::new();
        document.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::from(
                envelope
                    .capture_timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
        );
        document.insert(
            MESSAGE_FIELD.to_string(),
            Value::from(envelope.payload_text()),
        );
        document.insert(
            STREAM_FIELD.to_string(),
            Value::from(envelope.source_stream.as_str()),
        );
        document.insert(
            OWNER_FIELD.to_string(),
            owner_value(&envelope.owner_metadata),
        );

        PipelineEvent {
            owner: envelope.owner_metadata,
            stream: envelope.source_stream,
            capture_timestamp: envelope.capture_timestamp,
            document,
            markers: BTreeSet::new(),
        }
    }

    /// Rebuilds an event from a document received by the relay. Markers
    /// already in `tags` are recognized again so they are not duplicated.
    #[must_use]
    pub fn from_document(document: Map<String, Value>) -> Self {
        let owner = document
            .get(OWNER_FIELD)
            .cloned()
            .and_then(|v| serde_json::from_value::<OwnerMetadata>(v).ok())
            .unwrap_or_default();
        let stream = match document.get(STREAM_FIELD).and_then(Value::as_str) {
            Some("stderr") => SourceStream::Stderr,
            _ => SourceStream::Stdout,
        };
        let capture_timestamp = document
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc));
        let markers = document
            .get(TAGS_FIELD)
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .filter_map(|t| t.parse::<Marker>().ok())
                    .collect()
            })
            .unwrap_or_default();

        PipelineEvent {
            owner,
            stream,
            capture_timestamp,
            document,
            markers,
        }
    }

    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.owner.label(key)
    }

    #[must_use]
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.insert(marker);
        self
    }

    #[must_use]
    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }

    /// Replaces the owner metadata, keeping the document's `owner` in sync.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerMetadata) -> Self {
        self.document
            .insert(OWNER_FIELD.to_string(), owner_value(&owner));
        self.owner = owner;
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: Map<String, Value>) -> Self {
        self.document = document;
        self
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.document.get(MESSAGE_FIELD).and_then(Value::as_str)
    }

    /// Final document: markers are appended to `tags` (existing tags are kept,
    /// nothing is duplicated).
    #[must_use]
    pub fn into_document(self) -> Map<String, Value> {
        let mut document = self.document;
        if self.markers.is_empty() {
            return document;
        }
        let mut tags: Vec<Value> = match document.remove(TAGS_FIELD) {
            Some(Value::Array(tags)) => tags,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        for marker in self.markers {
            let tag = Value::from(marker.as_str());
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        document.insert(TAGS_FIELD.to_string(), Value::Array(tags));
        document
    }
}
