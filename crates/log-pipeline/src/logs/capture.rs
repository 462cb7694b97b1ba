// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Capture file format.
//!
//! The container runtime persists every line a process writes to a per-owner,
//! append-only file, one JSON envelope per line:
//!
//! ```json
//! {"log":"<raw line>\n","stream":"stdout","time":"2026-10-17T10:00:00.123456789Z",
//!  "owner":{"id":"4f1c","name":"user-service","labels":{"collect_logs_with_filebeat":"true"}}}
//! ```
//!
//! Files follow the runtime layout `<dir>/<owner_id>/<owner_id>-json.log`.
//! When `owner` (or `owner.id`) is missing the directory name is the owner id.
//!
//! [`CaptureWriter`] plays the runtime's part for tests and local demos.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logs::constants::{CAPTURE_FILE_SUFFIX, CONTAINER_CONFIG_FILE};
use crate::logs::record::LogRecord;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed capture envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("capture envelope has no owner id")]
    MissingOwner,
    #[error("capture line is not valid UTF-8")]
    InvalidUtf8,
}

/// Which output stream of the process produced the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStream {
    /// Primary output.
    Stdout,
    /// Secondary output.
    Stderr,
}

impl SourceStream {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceStream::Stdout => "stdout",
            SourceStream::Stderr => "stderr",
        }
    }
}

/// Identity and labels of the process (container) that owns a capture file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerMetadata {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl OwnerMetadata {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        OwnerMetadata {
            id: id.into(),
            ..OwnerMetadata::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Adds what `other` knows without discarding what is already known.
    /// Labels from `other` win on collision since they come from the runtime.
    pub fn merge_from(&mut self, other: &OwnerMetadata) {
        if self.id.is_empty() {
            self.id.clone_from(&other.id);
        }
        if other.name.is_some() {
            self.name.clone_from(&other.name);
        }
        if other.image.is_some() {
            self.image.clone_from(&other.image);
        }
        for (key, value) in &other.labels {
            self.labels.insert(key.clone(), value.clone());
        }
    }
}

/// One line of a capture file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEnvelope {
    /// Exact text emitted by the process, including the trailing newline.
    #[serde(rename = "log")]
    pub raw_payload: String,
    #[serde(rename = "stream")]
    pub source_stream: SourceStream,
    #[serde(rename = "time")]
    pub capture_timestamp: DateTime<Utc>,
    #[serde(rename = "owner", default)]
    pub owner_metadata: OwnerMetadata,
}

impl CaptureEnvelope {
    /// Parses one capture line. `fallback_owner_id` is used when the line
    /// itself does not name its owner (runtime layout).
    pub fn parse_line(line: &[u8], fallback_owner_id: Option<&str>) -> Result<Self, CaptureError> {
        let text = std::str::from_utf8(line).map_err(|_| CaptureError::InvalidUtf8)?;
        let mut envelope: CaptureEnvelope = serde_json::from_str(text.trim_end())?;
        if envelope.owner_metadata.id.is_empty() {
            match fallback_owner_id {
                Some(id) if !id.is_empty() => envelope.owner_metadata.id = id.to_string(),
                _ => return Err(CaptureError::MissingOwner),
            }
        }
        Ok(envelope)
    }

    /// The payload without its line terminator.
    #[must_use]
    pub fn payload_text(&self) -> &str {
        self.raw_payload
            .strip_suffix('\n')
            .map(|s| s.strip_suffix('\r').unwrap_or(s))
            .unwrap_or(&self.raw_payload)
    }

    pub fn to_line(&self) -> Result<String, CaptureError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Path of an owner's capture file in the runtime layout.
#[must_use]
pub fn capture_file_path(dir: &Path, owner_id: &str) -> PathBuf {
    dir.join(owner_id)
        .join(format!("{owner_id}{CAPTURE_FILE_SUFFIX}"))
}

/// Appends envelopes to an owner's capture file, as the runtime would.
pub struct CaptureWriter {
    owner: OwnerMetadata,
    owner_dir: PathBuf,
    file: File,
    embed_owner: bool,
}

impl CaptureWriter {
    /// Creates (or appends to) `<dir>/<owner.id>/<owner.id>-json.log`.
    pub fn create(dir: &Path, owner: OwnerMetadata) -> Result<Self, CaptureError> {
        if owner.id.is_empty() {
            return Err(CaptureError::MissingOwner);
        }
        let owner_dir = dir.join(&owner.id);
        fs::create_dir_all(&owner_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(capture_file_path(dir, &owner.id))?;
        Ok(CaptureWriter {
            owner,
            owner_dir,
            file,
            embed_owner: true,
        })
    }

    /// Write only `{"id": ...}` into each envelope, leaving name, image and
    /// labels to be resolved from the runtime's container config.
    #[must_use]
    pub fn without_embedded_metadata(mut self) -> Self {
        self.embed_owner = false;
        self
    }

    pub fn owner(&self) -> &OwnerMetadata {
        &self.owner
    }

    pub fn write_line(&mut self, stream: SourceStream, line: &str) -> Result<(), CaptureError> {
        self.write_line_at(stream, line, Utc::now())
    }

    pub fn write_line_at(
        &mut self,
        stream: SourceStream,
        line: &str,
        time: DateTime<Utc>,
    ) -> Result<(), CaptureError> {
        let mut raw_payload = line.to_string();
        if !raw_payload.ends_with('\n') {
            raw_payload.push('\n');
        }
        let owner_metadata = if self.embed_owner {
            self.owner.clone()
        } else {
            OwnerMetadata::new(self.owner.id.clone())
        };
        let envelope = CaptureEnvelope {
            raw_payload,
            source_stream: stream,
            capture_timestamp: time,
            owner_metadata,
        };
        let mut encoded = envelope.to_line()?;
        encoded.push('\n');
        self.file.write_all(encoded.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Writes a record as the process would print it to stdout.
    pub fn write_record(&mut self, record: &LogRecord) -> Result<(), CaptureError> {
        self.write_line(SourceStream::Stdout, &record.to_json_line())
    }

    /// Writes the runtime's `config.v2.json` for this owner.
    pub fn write_container_config(&self) -> Result<(), CaptureError> {
        let config = json!({
            "ID": self.owner.id,
            "Name": self.owner.name.as_ref().map(|n| format!("/{n}")),
            "Config": {
                "Image": self.owner.image,
                "Labels": self.owner.labels,
            },
            "Created": Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        });
        fs::write(
            self.owner_dir.join(CONTAINER_CONFIG_FILE),
            serde_json::to_vec_pretty(&config)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_envelope() {
        let line = br#"{"log":"{\"message\":\"hi\"}\n","stream":"stderr","time":"2026-10-17T10:00:00.123456789Z","owner":{"id":"abc","name":"svc","labels":{"admit":"true"}}}"#;
        let envelope = CaptureEnvelope::parse_line(line, None).unwrap();
        assert_eq!(envelope.source_stream, SourceStream::Stderr);
        assert_eq!(envelope.owner_metadata.id, "abc");
        assert_eq!(envelope.owner_metadata.label("admit"), Some("true"));
        assert_eq!(envelope.payload_text(), r#"{"message":"hi"}"#);
        assert_eq!(
            envelope.capture_timestamp.timestamp_subsec_nanos(),
            123_456_789
        );
    }

    #[test]
    fn test_parse_uses_fallback_owner_id() {
        let line = br#"{"log":"plain\r\n","stream":"stdout","time":"2026-10-17T10:00:00Z"}"#;
        let envelope = CaptureEnvelope::parse_line(line, Some("dir-id")).unwrap();
        assert_eq!(envelope.owner_metadata.id, "dir-id");
        assert_eq!(envelope.payload_text(), "plain");

        assert!(matches!(
            CaptureEnvelope::parse_line(line, None),
            Err(CaptureError::MissingOwner)
        ));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            CaptureEnvelope::parse_line(b"not json", Some("x")),
            Err(CaptureError::Malformed(_))
        ));
        assert!(matches!(
            CaptureEnvelope::parse_line(br#"{"log":"x","stream":"stdin","time":"2026-10-17T10:00:00Z"}"#, Some("x")),
            Err(CaptureError::Malformed(_))
        ));
        assert!(matches!(
            CaptureEnvelope::parse_line(&[0xff, 0xfe], Some("x")),
            Err(CaptureError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_writer_appends_runtime_layout() {
        let dir = tempfile::tempdir().unwrap();
        let owner = OwnerMetadata::new("c0ffee")
            .with_name("svc-a")
            .with_label("admit", "true");
        let mut writer = CaptureWriter::create(dir.path(), owner).unwrap();
        writer.write_line(SourceStream::Stdout, "first").unwrap();
        writer.write_line(SourceStream::Stderr, "second\n").unwrap();

        let path = capture_file_path(dir.path(), "c0ffee");
        assert!(path.ends_with("c0ffee/c0ffee-json.log"));
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second = CaptureEnvelope::parse_line(lines[1].as_bytes(), None).unwrap();
        assert_eq!(second.raw_payload, "second\n");
        assert_eq!(second.owner_metadata.name.as_deref(), Some("svc-a"));
    }

    #[test]
    fn test_writer_without_embedded_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let owner = OwnerMetadata::new("c0ffee").with_label("admit", "true");
        let mut writer = CaptureWriter::create(dir.path(), owner)
            .unwrap()
            .without_embedded_metadata();
        writer.write_line(SourceStream::Stdout, "x").unwrap();
        writer.write_container_config().unwrap();

        let content = fs::read_to_string(capture_file_path(dir.path(), "c0ffee")).unwrap();
        let envelope = CaptureEnvelope::parse_line(content.trim_end().as_bytes(), None).unwrap();
        assert!(envelope.owner_metadata.labels.is_empty());
        assert!(dir.path().join("c0ffee").join(CONTAINER_CONFIG_FILE).exists());
    }

    #[test]
    fn test_merge_from_prefers_runtime_labels() {
        let mut owner = OwnerMetadata::new("a").with_label("k", "old");
        owner.merge_from(
            &OwnerMetadata::new("ignored")
                .with_name("svc")
                .with_label("k", "new"),
        );
        assert_eq!(owner.id, "a");
        assert_eq!(owner.name.as_deref(), Some("svc"));
        assert_eq!(owner.label("k"), Some("new"));
    }
}
