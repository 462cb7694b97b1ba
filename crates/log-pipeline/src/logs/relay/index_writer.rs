// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Relay-side bulk writer.
//!
//! Connection handlers hand documents to the writer through a bounded queue
//! ([`IndexWriterHandle`]). The writer owns the only connection to the index
//! store and batches documents into bulk requests of at most
//! `bulk_max_docs`. While the store is unavailable the current batch is
//! retried with backoff and the queue fills up, which stops the handlers
//! from acknowledging further batches.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, Sender};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::event_bus::{publish, DropReason, Event};
use crate::logs::backoff::Backoff;
use crate::logs::constants::SHUTDOWN_FLUSH_ATTEMPTS;
use crate::logs::counters::PipelineCounters;
use crate::logs::index::{BulkDocument, BulkOutcome, IndexStore};

#[derive(Clone, Debug)]
pub struct IndexWriterHandle {
    tx: mpsc::Sender<BulkDocument>,
}

impl IndexWriterHandle {
    /// Queues a document, waiting while the queue is full. Fails only once
    /// the writer has stopped.
    pub async fn enqueue(
        &self,
        document: BulkDocument,
    ) -> Result<(), mpsc::error::SendError<BulkDocument>> {
        self.tx.send(document).await
    }

    /// Queues a whole batch. When the batch fits in the queue nothing is
    /// queued until every slot is free, so dropping this future part way
    /// leaves no document of the batch behind.
    pub async fn enqueue_batch(
        &self,
        documents: Vec<BulkDocument>,
    ) -> Result<(), mpsc::error::SendError<()>> {
        if documents.is_empty() {
            return Ok(());
        }
        if documents.len() <= self.tx.max_capacity() {
            let permits = self.tx.reserve_many(documents.len()).await?;
            for (permit, document) in permits.zip(documents) {
                permit.send(document);
            }
            return Ok(());
        }
        for document in documents {
            self.tx
                .send(document)
                .await
                .map_err(|_| mpsc::error::SendError(()))?;
        }
        Ok(())
    }
}

pub struct IndexWriter {
    rx: mpsc::Receiver<BulkDocument>,
    store: Arc<dyn IndexStore>,
    bulk_max_docs: usize,
    flush_interval: Duration,
    backoff: Backoff,
    counters: Arc<PipelineCounters>,
    events: Option<Sender<Event>>,
    cancel_token: CancellationToken,
    pending: Vec<BulkDocument>,
    retry_at: Option<Instant>,
    last_flush: Instant,
    stopping: bool,
    closed: bool,
    failures_while_stopping: usize,
}

impl IndexWriter {
    #[must_use]
    pub fn new(
        config: &Config,
        store: Arc<dyn IndexStore>,
        counters: Arc<PipelineCounters>,
        events: Option<Sender<Event>>,
        cancel_token: CancellationToken,
    ) -> (Self, IndexWriterHandle) {
        // A zero-sized queue still needs one slot; the handler then waits
        // for every document to be taken by the writer.
        let (tx, rx) = mpsc::channel(config.relay_queue_capacity.max(1));
        let writer = IndexWriter {
            rx,
            store,
            bulk_max_docs: config.index_bulk_max_docs,
            flush_interval: config.index_flush_interval,
            backoff: Backoff::new(config.index_backoff_base, config.index_backoff_max),
            counters,
            events,
            cancel_token,
            pending: Vec::new(),
            retry_at: None,
            last_flush: Instant::now(),
            stopping: false,
            closed: false,
            failures_while_stopping: 0,
        };
        (writer, IndexWriterHandle { tx })
    }

    fn next_flush_at(&self) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        if self.stopping || self.closed {
            return Some(Instant::now());
        }
        if let Some(retry_at) = self.retry_at {
            return Some(retry_at);
        }
        if self.pending.len() >= self.bulk_max_docs {
            return Some(Instant::now());
        }
        Some(self.last_flush + self.flush_interval)
    }

    pub async fn run(mut self) {
        debug!("RELAY | Index writer started");
        loop {
            if self.closed && self.pending.is_empty() {
                break;
            }
            let flush_at = self.next_flush_at();
            let accepting = !self.closed && self.pending.len() < self.bulk_max_docs;
            tokio::select! {
                () = self.cancel_token.cancelled(), if !self.stopping => {
                    self.stopping = true;
                }
                received = self.rx.recv(), if accepting => match received {
                    Some(document) => self.pending.push(document),
                    None => self.closed = true,
                },
                () = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    if !self.flush().await && (self.stopping || self.closed) {
                        self.failures_while_stopping += 1;
                        if self.failures_while_stopping >= SHUTDOWN_FLUSH_ATTEMPTS {
                            self.abandon();
                            break;
                        }
                    }
                }
                else => break,
            }
        }
        debug!("RELAY | Index writer stopped");
    }

    /// One bulk request. Returns whether the pending batch is done.
    async fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return true;
        }
        match self.store.bulk_append(&self.pending).await {
            Ok(outcome) => self.apply(outcome),
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    "RELAY | Bulk request of {} documents failed (attempt {}): {}, retrying in {:?}",
                    self.pending.len(),
                    self.backoff.attempts(),
                    e,
                    delay
                );
                self.retry_at = Some(Instant::now() + delay);
                false
            }
        }
    }

    /// Everything from the first transiently refused document onwards is
    /// sent again, so documents after it may be stored twice but never
    /// ahead of it.
    fn apply(&mut self, outcome: BulkOutcome) -> bool {
        let resend_from = outcome.retryable.iter().min().copied();
        let indexed = match resend_from {
            None => outcome.indexed,
            Some(first) => {
                first
                    - outcome
                        .rejected
                        .iter()
                        .filter(|r| r.position < first)
                        .count()
            }
        };
        if indexed > 0 {
            PipelineCounters::add(&self.counters.indexed, indexed);
            publish(
                self.events.as_ref(),
                Event::RecordsIndexed { count: indexed },
            );
        }
        for rejection in &outcome.rejected {
            let index = self
                .pending
                .get(rejection.position)
                .map_or("?", |d| d.index.as_str());
            error!(
                "RELAY | Index store rejected a document for {} ({}): {}",
                index, rejection.status, rejection.reason
            );
            PipelineCounters::incr(&self.counters.rejected);
            publish(
                self.events.as_ref(),
                Event::RecordDropped {
                    reason: DropReason::Rejected,
                },
            );
        }

        let Some(first) = resend_from else {
            self.pending.clear();
            self.backoff.reset();
            self.retry_at = None;
            self.last_flush = Instant::now();
            return true;
        };

        self.pending = std::mem::take(&mut self.pending)
            .into_iter()
            .enumerate()
            .skip(first)
            .filter(|(position, _)| !outcome.rejected.iter().any(|r| r.position == *position))
            .map(|(_, document)| document)
            .collect();
        let delay = self.backoff.next_delay();
        warn!(
            "RELAY | {} documents refused temporarily, retrying in {:?}",
            self.pending.len(),
            delay
        );
        self.retry_at = Some(Instant::now() + delay);
        false
    }

    fn abandon(&mut self) {
        self.rx.close();
        let mut lost = self.pending.len();
        self.pending.clear();
        while self.rx.try_recv().is_ok() {
            lost += 1;
        }
        if lost > 0 {
            error!(
                "RELAY | Index store unavailable at shutdown after {} attempts, {} document(s) lost",
                SHUTDOWN_FLUSH_ATTEMPTS, lost
            );
            PipelineCounters::add(&self.counters.lost, lost);
            publish(self.events.as_ref(), Event::RecordsLost { count: lost });
        }
    }
}

/// Routes a document for the writer, using ingestion time when it has no
/// usable `@timestamp`.
#[must_use]
pub fn route(prefix: &str, document: Map<String, Value>) -> BulkDocument {
    BulkDocument::route(prefix, document, Utc::now())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::logs::index::memory::InMemoryIndexStore;

    fn config() -> Config {
        Config {
            index_bulk_max_docs: 2,
            index_flush_interval: Duration::from_millis(10),
            index_backoff_base: Duration::from_millis(10),
            index_backoff_max: Duration::from_millis(20),
            ..Config::default()
        }
    }

    fn document(n: usize) -> BulkDocument {
        route(
            "logstash",
            match json!({"@timestamp": "2026-10-17T10:00:00Z", "n": n}) {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_writes_everything_in_order() {
        let store = Arc::new(InMemoryIndexStore::new());
        let counters = Arc::new(PipelineCounters::default());
        let (writer, handle) = IndexWriter::new(
            &config(),
            store.clone(),
            counters.clone(),
            None,
            CancellationToken::new(),
        );
        let task = tokio::spawn(writer.run());
        for n in 0..5 {
            handle.enqueue(document(n)).await.unwrap();
        }
        drop(handle);
        task.await.unwrap();

        let ns: Vec<u64> = store
            .documents("logstash-2026.10.17")
            .await
            .iter()
            .map(|d| d["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
        assert_eq!(counters.snapshot().indexed, 5);
    }

    #[tokio::test]
    async fn test_retries_until_store_recovers() {
        let store = Arc::new(InMemoryIndexStore::new());
        store.set_available(false);
        let counters = Arc::new(PipelineCounters::default());
        let (writer, handle) = IndexWriter::new(
            &config(),
            store.clone(),
            counters.clone(),
            None,
            CancellationToken::new(),
        );
        let task = tokio::spawn(writer.run());
        handle.enqueue(document(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.count().await, 0);

        store.set_available(true);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.count().await, 1);
        drop(handle);
        task.await.unwrap();
        assert_eq!(counters.snapshot().lost, 0);
    }

    /// Stores everything but the first document of the first request, which
    /// it refuses as a transient failure.
    struct RefusesFirstOnce {
        inner: InMemoryIndexStore,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl IndexStore for RefusesFirstOnce {
        async fn bulk_append(
            &self,
            documents: &[BulkDocument],
        ) -> Result<BulkOutcome, crate::logs::index::IndexError> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call > 0 {
                return self.inner.bulk_append(documents).await;
            }
            self.inner.bulk_append(&documents[1..]).await?;
            Ok(BulkOutcome {
                indexed: documents.len() - 1,
                retryable: vec![0],
                rejected: Vec::new(),
            })
        }

        async fn search_field(
            &self,
            index_pattern: &str,
            field: &str,
            value: &str,
        ) -> Result<Vec<Map<String, Value>>, crate::logs::index::IndexError> {
            self.inner.search_field(index_pattern, field, value).await
        }

        async fn search_time_range(
            &self,
            index_pattern: &str,
            from: chrono::DateTime<Utc>,
            to: chrono::DateTime<Utc>,
        ) -> Result<Vec<Map<String, Value>>, crate::logs::index::IndexError> {
            self.inner.search_time_range(index_pattern, from, to).await
        }

        async fn health(&self) -> Result<(), crate::logs::index::IndexError> {
            self.inner.health().await
        }
    }

    #[tokio::test]
    async fn test_partial_retry_keeps_capture_order() {
        let store = Arc::new(RefusesFirstOnce {
            inner: InMemoryIndexStore::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let counters = Arc::new(PipelineCounters::default());
        let config = Config {
            index_bulk_max_docs: 3,
            ..config()
        };
        let (writer, handle) = IndexWriter::new(
            &config,
            store.clone(),
            counters.clone(),
            None,
            CancellationToken::new(),
        );
        for n in 0..3 {
            handle.enqueue(document(n)).await.unwrap();
        }
        drop(handle);
        tokio::spawn(writer.run()).await.unwrap();

        let stored: Vec<u64> = store
            .inner
            .documents("logstash-2026.10.17")
            .await
            .iter()
            .map(|d| d["n"].as_u64().unwrap())
            .collect();
        // The refused document is resent with everything after it.
        assert_eq!(stored, vec![1, 2, 0, 1, 2]);
        assert_eq!(counters.snapshot().indexed, 3);
        assert_eq!(counters.snapshot().lost, 0);
    }

    #[tokio::test]
    async fn test_reports_loss_when_store_stays_down() {
        let store = Arc::new(InMemoryIndexStore::new());
        store.set_available(false);
        let counters = Arc::new(PipelineCounters::default());
        let cancel = CancellationToken::new();
        let (writer, handle) =
            IndexWriter::new(&config(), store, counters.clone(), None, cancel.clone());
        let task = tokio::spawn(writer.run());
        for n in 0..3 {
            handle.enqueue(document(n)).await.unwrap();
        }
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(counters.snapshot().lost, 3);
        assert_eq!(counters.snapshot().indexed, 0);
    }
}
