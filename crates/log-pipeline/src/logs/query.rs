// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Reading traces and time windows back from the index.
//!
//! Records of one trace come from several services whose clocks and
//! emission order differ; they only form a readable story once ordered by
//! their own `@timestamp`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::logs::constants::PARENT_ID_FIELD;
use crate::logs::index::{document_time, IndexError, IndexStore};

/// Stable sort by `@timestamp`; documents without a parseable timestamp go
/// last, in their original order.
pub fn sort_by_timestamp(documents: &mut [Map<String, Value>]) {
    documents.sort_by(|a, b| match (document_time(a), document_time(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Every record of a trace, oldest first.
pub async fn fetch_trace(
    store: &dyn IndexStore,
    index_pattern: &str,
    trace_id: &str,
) -> Result<Vec<Map<String, Value>>, IndexError> {
    let mut documents = store.search_trace(index_pattern, trace_id).await?;
    sort_by_timestamp(&mut documents);
    Ok(documents)
}

/// Every record stamped in `[from, to)`, oldest first.
pub async fn fetch_time_range(
    store: &dyn IndexStore,
    index_pattern: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Map<String, Value>>, IndexError> {
    let mut documents = store.search_time_range(index_pattern, from, to).await?;
    sort_by_timestamp(&mut documents);
    Ok(documents)
}

/// Records emitted by root spans (no `parentId`).
#[must_use]
pub fn root_span_records(documents: &[Map<String, Value>]) -> Vec<&Map<String, Value>> {
    documents
        .iter()
        .filter(|d| matches!(d.get(PARENT_ID_FIELD), None | Some(Value::Null)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::logs::index::memory::InMemoryIndexStore;
    use crate::logs::index::BulkDocument;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_sort_by_timestamp_across_offsets() {
        let mut documents = vec![
            object(json!({"n": 1, "@timestamp": "2026-10-17T12:00:00.300+02:00"})),
            object(json!({"n": 2})),
            object(json!({"n": 3, "@timestamp": "2026-10-17T10:00:00.100Z"})),
            object(json!({"n": 4, "@timestamp": "2026-10-17T10:00:00.200Z"})),
        ];
        sort_by_timestamp(&mut documents);
        let order: Vec<u64> = documents.iter().map(|d| d["n"].as_u64().unwrap()).collect();
        assert_eq!(order, vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_root_span_records() {
        let documents = vec![
            object(json!({"spanId": "a"})),
            object(json!({"spanId": "b", "parentId": "a"})),
        ];
        let roots = root_span_records(&documents);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0]["spanId"], json!("a"));
    }

    #[tokio::test]
    async fn test_fetch_trace_orders_results() {
        let store = InMemoryIndexStore::new();
        let documents: Vec<BulkDocument> = [
            ("2026-10-17T10:00:02Z", "t1"),
            ("2026-10-17T10:00:01Z", "t1"),
            ("2026-10-17T10:00:00Z", "t2"),
        ]
        .into_iter()
        .map(|(ts, trace)| BulkDocument {
            index: "logstash-2026.10.17".to_string(),
            document: object(json!({"@timestamp": ts, "traceId": trace})),
        })
        .collect();
        store.bulk_append(&documents).await.unwrap();

        let trace = fetch_trace(&store, "logstash-*", "t1").await.unwrap();
        let stamps: Vec<&str> = trace
            .iter()
            .map(|d| d["@timestamp"].as_str().unwrap())
            .collect();
        assert_eq!(stamps, vec!["2026-10-17T10:00:01Z", "2026-10-17T10:00:02Z"]);
    }

    #[tokio::test]
    async fn test_fetch_time_range_orders_results() {
        let store = InMemoryIndexStore::new();
        let documents: Vec<BulkDocument> = [
            "2026-10-17T10:00:03Z",
            "2026-10-17T09:00:00Z",
            "2026-10-17T10:00:01Z",
        ]
        .into_iter()
        .map(|ts| BulkDocument {
            index: "logstash-2026.10.17".to_string(),
            document: object(json!({"@timestamp": ts})),
        })
        .collect();
        store.bulk_append(&documents).await.unwrap();

        let from = DateTime::parse_from_rfc3339("2026-10-17T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let window = fetch_time_range(&store, "logstash-*", from, from + chrono::Duration::hours(1))
            .await
            .unwrap();
        let stamps: Vec<&str> = window
            .iter()
            .map(|d| d["@timestamp"].as_str().unwrap())
            .collect();
        assert_eq!(stamps, vec!["2026-10-17T10:00:01Z", "2026-10-17T10:00:03Z"]);
    }
}
