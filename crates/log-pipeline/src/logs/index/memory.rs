// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! In-memory index store for tests and single-node local runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::logs::index::{
    document_time, pattern_matches, BulkDocument, BulkOutcome, IndexError, IndexStore,
};

#[derive(Debug)]
pub struct InMemoryIndexStore {
    indices: RwLock<BTreeMap<String, Vec<Map<String, Value>>>>,
    available: AtomicBool,
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        InMemoryIndexStore {
            indices: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryIndexStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn index_names(&self) -> Vec<String> {
        self.indices.read().await.keys().cloned().collect()
    }

    /// All documents of the matching indices, in append order per index.
    pub async fn documents(&self, index_pattern: &str) -> Vec<Map<String, Value>> {
        self.indices
            .read()
            .await
            .iter()
            .filter(|(name, _)| pattern_matches(index_pattern, name))
            .flat_map(|(_, docs)| docs.iter().cloned())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.indices.read().await.values().map(Vec::len).sum()
    }

    fn check_available(&self) -> Result<(), IndexError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexError::Unavailable)
        }
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn bulk_append(&self, documents: &[BulkDocument]) -> Result<BulkOutcome, IndexError> {
        self.check_available()?;
        let mut indices = self.indices.write().await;
        for document in documents {
            indices
                .entry(document.index.clone())
                .or_default()
                .push(document.document.clone());
        }
        Ok(BulkOutcome::all_indexed(documents.len()))
    }

    async fn search_field(
        &self,
        index_pattern: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Map<String, Value>>, IndexError> {
        self.check_available()?;
        Ok(self
            .documents(index_pattern)
            .await
            .into_iter()
            .filter(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
            .collect())
    }

    async fn search_time_range(
        &self,
        index_pattern: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Map<String, Value>>, IndexError> {
        self.check_available()?;
        Ok(self
            .documents(index_pattern)
            .await
            .into_iter()
            .filter(|doc| document_time(doc).is_some_and(|t| from <= t && t < to))
            .collect())
    }

    async fn health(&self) -> Result<(), IndexError> {
        self.check_available()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bulk(index: &str, value: Value) -> BulkDocument {
        BulkDocument {
            index: index.to_string(),
            document: match value {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_append_and_search() {
        let store = InMemoryIndexStore::new();
        store
            .bulk_append(&[
                bulk("logstash-2026.10.16", json!({"traceId": "t1", "n": 1})),
                bulk("logstash-2026.10.17", json!({"traceId": "t1", "n": 2})),
                bulk("other-2026.10.17", json!({"traceId": "t1", "n": 3})),
                bulk("logstash-2026.10.17", json!({"traceId": "t2", "n": 4})),
            ])
            .await
            .unwrap();

        assert_eq!(store.count().await, 4);
        let trace = store.search_trace("logstash-*", "t1").await.unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(
            store.index_names().await,
            vec![
                "logstash-2026.10.16",
                "logstash-2026.10.17",
                "other-2026.10.17"
            ]
        );
    }

    #[tokio::test]
    async fn test_time_range_search() {
        let store = InMemoryIndexStore::new();
        store
            .bulk_append(&[
                bulk("logstash-2026.10.17", json!({"@timestamp": "2026-10-17T09:59:59.999Z", "n": 1})),
                bulk("logstash-2026.10.17", json!({"@timestamp": "2026-10-17T12:00:00+02:00", "n": 2})),
                bulk("logstash-2026.10.17", json!({"@timestamp": "2026-10-17T10:30:00Z", "n": 3})),
                bulk("logstash-2026.10.17", json!({"@timestamp": "2026-10-17T11:00:00Z", "n": 4})),
                bulk("logstash-2026.10.17", json!({"n": 5})),
            ])
            .await
            .unwrap();

        let from = DateTime::parse_from_rfc3339("2026-10-17T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let to = DateTime::parse_from_rfc3339("2026-10-17T11:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let found: Vec<u64> = store
            .search_time_range("logstash-*", from, to)
            .await
            .unwrap()
            .iter()
            .map(|d| d["n"].as_u64().unwrap())
            .collect();
        // 12:00+02:00 is 10:00Z, inside; 11:00Z is the exclusive end.
        assert_eq!(found, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryIndexStore::new();
        store.set_available(false);
        assert!(matches!(
            store.bulk_append(&[bulk("i", json!({}))]).await,
            Err(IndexError::Unavailable)
        ));
        assert!(store.health().await.is_err());
        store.set_available(true);
        assert!(store.health().await.is_ok());
        assert_eq!(store.count().await, 0);
    }
}
