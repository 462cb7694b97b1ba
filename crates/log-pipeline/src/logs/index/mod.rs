// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Index store abstraction.
//!
//! Documents are appended to time-partitioned indices named
//! `<prefix>-YYYY.MM.DD`, chosen from the document's own `@timestamp` in UTC.
//! The pipeline only ever appends; lookups read traces and time windows back.

pub mod elasticsearch;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::logs::constants::TIMESTAMP_FIELD;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("index store answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected index store response: {0}")]
    Decode(String),
    #[error("index store unavailable")]
    Unavailable,
}

/// One document and the index it goes to.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    pub index: String,
    pub document: Map<String, Value>,
}

impl BulkDocument {
    /// Routes a document by its `@timestamp`, or by `now` when the
    /// timestamp is missing or unparseable.
    #[must_use]
    pub fn route(prefix: &str, document: Map<String, Value>, now: DateTime<Utc>) -> Self {
        BulkDocument {
            index: index_name(prefix, &document, now),
            document,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position of the document in the request.
    pub position: usize,
    pub status: u16,
    pub reason: String,
}

/// Per-document result of a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub indexed: usize,
    /// Positions that failed transiently and should be sent again.
    pub retryable: Vec<usize>,
    /// Documents the store will never accept.
    pub rejected: Vec<Rejection>,
}

impl BulkOutcome {
    #[must_use]
    pub fn all_indexed(count: usize) -> Self {
        BulkOutcome {
            indexed: count,
            ..BulkOutcome::default()
        }
    }

    /// Adds the outcome of a request that carried the documents starting at
    /// `offset` of the same batch.
    pub fn extend_at(&mut self, offset: usize, other: BulkOutcome) {
        self.indexed += other.indexed;
        self.retryable
            .extend(other.retryable.into_iter().map(|position| position + offset));
        self.rejected
            .extend(other.rejected.into_iter().map(|rejection| Rejection {
                position: rejection.position + offset,
                ..rejection
            }));
    }
}

#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Appends documents. `Err` means nothing is known to be stored and the
    /// whole request may be retried.
    async fn bulk_append(&self, documents: &[BulkDocument]) -> Result<BulkOutcome, IndexError>;

    /// Documents whose `field` equals `value` in the indices matching
    /// `index_pattern` (`logstash-*`, or an exact name). Order is unspecified.
    async fn search_field(
        &self,
        index_pattern: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Map<String, Value>>, IndexError>;

    /// Every document of a trace, unordered.
    async fn search_trace(
        &self,
        index_pattern: &str,
        trace_id: &str,
    ) -> Result<Vec<Map<String, Value>>, IndexError> {
        self.search_field(index_pattern, crate::logs::constants::TRACE_ID_FIELD, trace_id)
            .await
    }

    /// Documents stamped at or after `from` and before `to`, unordered.
    async fn search_time_range(
        &self,
        index_pattern: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Map<String, Value>>, IndexError>;

    async fn health(&self) -> Result<(), IndexError>;
}

/// The `@timestamp` of a document, in UTC.
#[must_use]
pub fn document_time(document: &Map<String, Value>) -> Option<DateTime<Utc>> {
    document
        .get(TIMESTAMP_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[must_use]
pub fn index_name_at(prefix: &str, time: DateTime<Utc>) -> String {
    format!("{prefix}-{}", time.format("%Y.%m.%d"))
}

#[must_use]
pub fn index_name(prefix: &str, document: &Map<String, Value>, now: DateTime<Utc>) -> String {
    index_name_at(prefix, document_time(document).unwrap_or(now))
}

/// Pattern selecting every index of a prefix.
#[must_use]
pub fn wildcard(prefix: &str) -> String {
    format!("{prefix}-*")
}

/// Index pattern matching as the index store does it for the simple cases
/// the pipeline uses: exact names, `*` wildcards and comma-separated lists.
#[must_use]
pub fn pattern_matches(pattern: &str, index: &str) -> bool {
    pattern
        .split(',')
        .map(str::trim)
        .any(|p| glob_matches(p.as_bytes(), index.as_bytes()))
}

fn glob_matches(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|i| glob_matches(rest, &text[i..])),
        Some((c, rest)) => text
            .split_first()
            .is_some_and(|(t, text_rest)| t == c && glob_matches(rest, text_rest)),
    }
}
