// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Elasticsearch-compatible HTTP client (`POST /_bulk`, `POST /<pattern>/_search`).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::logs::constants::TIMESTAMP_FIELD;
use crate::logs::index::{BulkDocument, BulkOutcome, IndexError, IndexStore, Rejection};

/// Largest result set a single search returns.
const MAX_SEARCH_HITS: usize = 10_000;

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: reqwest::Client,
    url: String,
}

impl ElasticsearchStore {
    #[must_use]
    pub fn new(client: reqwest::Client, url: String) -> Self {
        ElasticsearchStore {
            url: url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn search(
        &self,
        index_pattern: &str,
        query: Value,
    ) -> Result<Vec<Map<String, Value>>, IndexError> {
        let resp = self
            .client
            .post(format!("{}/{}/_search", self.url, index_pattern))
            .json(&json!({"size": MAX_SEARCH_HITS, "query": query}))
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            // No index matches the pattern yet.
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(IndexError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let response: SearchResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        Ok(response.hits.hits.into_iter().map(|h| h.source).collect())
    }

    fn bulk_body(documents: &[BulkDocument]) -> String {
        let mut body = String::new();
        for document in documents {
            body.push_str(&json!({"index": {"_index": document.index}}).to_string());
            body.push('\n');
            body.push_str(&Value::Object(document.document.clone()).to_string());
            body.push('\n');
        }
        body
    }
}

fn is_retryable(status: u16) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS.as_u16() || status >= 500
}

/// Whole-request failures that say nothing about the documents themselves.
fn is_transient_request_failure(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::REQUEST_TIMEOUT
    ) || is_retryable(status.as_u16())
}

/// Splits a bulk response into indexed, retryable and rejected documents.
fn bulk_outcome(response: BulkResponse, sent: usize) -> Result<BulkOutcome, IndexError> {
    if !response.errors {
        return Ok(BulkOutcome::all_indexed(sent));
    }
    if response.items.len() != sent {
        return Err(IndexError::Decode(format!(
            "bulk response has {} items for {} documents",
            response.items.len(),
            sent
        )));
    }
    let mut outcome = BulkOutcome::default();
    for (position, item) in response.items.iter().enumerate() {
        // Each item is keyed by its action: {"index": {...}}
        let result = item.values().next();
        let status = result
            .and_then(|r| r.get("status"))
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(500);
        if (200..300).contains(&status) {
            outcome.indexed += 1;
        } else if is_retryable(status) {
            outcome.retryable.push(position);
        } else {
            let reason = result
                .and_then(|r| r.get("error"))
                .map_or_else(|| "unknown error".to_string(), Value::to_string);
            outcome.rejected.push(Rejection {
                position,
                status,
                reason,
            });
        }
    }
    Ok(outcome)
}

/// Result of one `_bulk` request that reached the store.
enum BulkAttempt {
    Answered(BulkOutcome),
    /// The whole request was refused for a reason tied to its content.
    Refused { status: StatusCode, body: String },
}

impl ElasticsearchStore {
    async fn send_bulk(&self, documents: &[BulkDocument]) -> Result<BulkAttempt, IndexError> {
        let resp = self
            .client
            .post(format!("{}/_bulk", self.url))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(Self::bulk_body(documents))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let response: BulkResponse = resp
                .json()
                .await
                .map_err(|e| IndexError::Decode(e.to_string()))?;
            return bulk_outcome(response, documents.len()).map(BulkAttempt::Answered);
        }

        let body = resp.text().await.unwrap_or_default();
        if is_transient_request_failure(status) {
            error!(
                "RELAY | Bulk request of {} documents refused with {}: {}",
                documents.len(),
                status,
                body
            );
            return Err(IndexError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(BulkAttempt::Refused { status, body })
    }
}

#[async_trait]
impl IndexStore for ElasticsearchStore {
    /// A request refused as a whole for a non-transient reason is split in
    /// halves until the document responsible is alone; only that one is
    /// rejected.
    async fn bulk_append(&self, documents: &[BulkDocument]) -> Result<BulkOutcome, IndexError> {
        let mut outcome = BulkOutcome::default();
        // Ranges still to send; the next one is on top.
        let mut ranges = vec![(0, documents.len())];
        while let Some((start, end)) = ranges.pop() {
            if start == end {
                continue;
            }
            let part = &documents[start..end];
            match self.send_bulk(part).await {
                Ok(BulkAttempt::Answered(answered)) => outcome.extend_at(start, answered),
                Ok(BulkAttempt::Refused { status, .. }) if part.len() > 1 => {
                    warn!(
                        "RELAY | Bulk request of {} documents refused with {}, splitting it",
                        part.len(),
                        status
                    );
                    let middle = start + part.len() / 2;
                    ranges.push((middle, end));
                    ranges.push((start, middle));
                }
                Ok(BulkAttempt::Refused { status, body }) => {
                    error!(
                        "RELAY | Bulk request for a single document to {} refused with {}: {}",
                        part[0].index, status, body
                    );
                    outcome.rejected.push(Rejection {
                        position: start,
                        status: status.as_u16(),
                        reason: body,
                    });
                }
                Err(e) if start == 0 => return Err(e),
                // Everything before `start` has an answer; the rest goes again.
                Err(e) => {
                    warn!("RELAY | Part of a split bulk request failed: {}", e);
                    outcome.retryable.extend(start..documents.len());
                    break;
                }
            }
        }
        Ok(outcome)
    }

    async fn search_field(
        &self,
        index_pattern: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Map<String, Value>>, IndexError> {
        self.search(index_pattern, json!({"match_phrase": {field: value}}))
            .await
    }

    async fn search_time_range(
        &self,
        index_pattern: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Map<String, Value>>, IndexError> {
        let range = json!({"range": {TIMESTAMP_FIELD: {
            "gte": from.to_rfc3339_opts(SecondsFormat::Millis, true),
            "lt": to.to_rfc3339_opts(SecondsFormat::Millis, true),
        }}});
        self.search(index_pattern, range).await
    }

    async fn health(&self) -> Result<(), IndexError> {
        let resp = self.client.get(format!("{}/", self.url)).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(IndexError::Status {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}
