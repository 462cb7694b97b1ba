// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! The relay: accepts batches from collectors and writes them to the index.
//!
//! ```text
//!   collector ──TCP──> handler ──┐
//!   collector ──TCP──> handler ──┼──> [chain] ──> bounded queue ──> IndexWriter ──> IndexStore
//!   collector ──TCP──> handler ──┘
//! ```
//!
//! A handler acknowledges a batch only after every surviving document is in
//! the queue. A full queue therefore stalls the handler, which stops reading
//! from its connection.

pub mod index_writer;

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Sender;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::event_bus::{publish, Event};
use crate::logs::counters::{CountersSnapshot, PipelineCounters};
use crate::logs::event::PipelineEvent;
use crate::logs::index::{BulkDocument, IndexStore};
use crate::logs::processor::registry::{BuildContext, ProcessorRegistry};
use crate::logs::processor::{ChainResult, ProcessorChain};
use crate::logs::transport::{codec, decode_batch, encode_ack};

use self::index_writer::{route, IndexWriter, IndexWriterHandle};

pub struct Relay {
    config: Arc<Config>,
    chain: Arc<ProcessorChain>,
    store: Arc<dyn IndexStore>,
    counters: Arc<PipelineCounters>,
    events: Option<Sender<Event>>,
}

impl Relay {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn IndexStore>,
        events: Option<Sender<Event>>,
    ) -> Result<Self, PipelineError> {
        // No owner metadata on this side: add_docker_metadata is refused.
        let chain = ProcessorRegistry::default()
            .build_chain(&config.relay_processors, &BuildContext::default())?;
        Ok(Relay {
            config,
            chain: Arc::new(chain),
            store,
            counters: Arc::new(PipelineCounters::default()),
            events,
        })
    }

    pub async fn start(self, cancel_token: CancellationToken) -> Result<RunningRelay, PipelineError> {
        if self.config.relay_queue_capacity == 0 {
            self.store
                .health()
                .await
                .map_err(|e| PipelineError::DownstreamUnreachable {
                    component: "index store",
                    reason: e.to_string(),
                })?;
        }

        let addr = self.config.relay_listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| PipelineError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| PipelineError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let writer_token = CancellationToken::new();
        let (writer, handle) = IndexWriter::new(
            &self.config,
            Arc::clone(&self.store),
            Arc::clone(&self.counters),
            self.events.clone(),
            writer_token.clone(),
        );
        let writer = tokio::spawn(writer.run());

        let acceptor = Acceptor {
            listener,
            connections: Arc::new(Semaphore::new(self.config.relay_max_connections)),
            max_connections: self.config.relay_max_connections,
            context: Arc::new(ConnectionContext {
                chain: self.chain,
                writer: handle,
                index_prefix: self.config.index_prefix.clone(),
                counters: Arc::clone(&self.counters),
                events: self.events,
                cancel_token: cancel_token.clone(),
            }),
        };
        let acceptor = tokio::spawn(acceptor.run());
        info!("RELAY | Listening on {}", local_addr);

        Ok(RunningRelay {
            local_addr,
            cancel_token,
            writer_token,
            acceptor,
            writer,
            counters: self.counters,
        })
    }
}

pub struct RunningRelay {
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    writer_token: CancellationToken,
    acceptor: JoinHandle<()>,
    writer: JoinHandle<()>,
    counters: Arc<PipelineCounters>,
}

impl RunningRelay {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Stops accepting, lets handlers finish the batch they are processing
    /// and drains the queue to the index store.
    pub async fn shutdown(self) -> CountersSnapshot {
        self.cancel_token.cancel();
        // Handlers blocked on a full queue only return once the writer
        // gives up, so the writer is told to stop retrying right away.
        self.writer_token.cancel();
        if let Err(e) = self.acceptor.await {
            error!("RELAY | Acceptor task failed: {}", e);
        }
        if let Err(e) = self.writer.await {
            error!("RELAY | Index writer task failed: {}", e);
        }
        let snapshot = self.counters.snapshot();
        info!("RELAY | Stopped: {:?}", snapshot);
        snapshot
    }
}

struct ConnectionContext {
    chain: Arc<ProcessorChain>,
    writer: IndexWriterHandle,
    index_prefix: String,
    counters: Arc<PipelineCounters>,
    events: Option<Sender<Event>>,
    cancel_token: CancellationToken,
}

struct Acceptor {
    listener: TcpListener,
    connections: Arc<Semaphore>,
    max_connections: usize,
    context: Arc<ConnectionContext>,
}

impl Acceptor {
    async fn run(self) {
        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                () = self.context.cancel_token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => match Arc::clone(&self.connections).try_acquire_owned() {
                        Ok(permit) => {
                            debug!("RELAY | Accepted connection from {}", peer);
                            handlers.spawn(handle_connection(
                                stream,
                                peer,
                                Arc::clone(&self.context),
                                permit,
                            ));
                        }
                        Err(_) => {
                            warn!(
                                "RELAY | Connection limit ({}) reached, refusing {}",
                                self.max_connections, peer
                            );
                            drop(stream);
                        }
                    },
                    Err(e) => warn!("RELAY | Failed to accept connection: {}", e),
                },
                Some(result) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = result {
                        error!("RELAY | Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(self.listener);
        while let Some(result) = handlers.join_next().await {
            if let Err(e) = result {
                error!("RELAY | Connection task failed: {}", e);
            }
        }
        debug!("RELAY | All connections closed");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<ConnectionContext>,
    _permit: OwnedSemaphorePermit,
) {
    let mut framed = Framed::new(stream, codec());
    loop {
        let frame = tokio::select! {
            () = context.cancel_token.cancelled() => break,
            frame = framed.next() => frame,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!("RELAY | Read from {} failed: {}", peer, e);
                break;
            }
            None => break,
        };
        let batch = match decode_batch(&frame) {
            Ok(batch) => batch,
            Err(e) => {
                // No ack: the collector keeps the batch and sends it again.
                error!("RELAY | Invalid batch from {}, closing connection: {}", peer, e);
                break;
            }
        };

        let seq = batch.seq;
        let count = batch.events.len();
        let documents = run_chain(&context, batch.events).await;
        // A collector that gave up waiting resends the batch on a new
        // connection, so this copy is abandoned once the peer goes away.
        let queued = tokio::select! {
            queued = context.writer.enqueue_batch(documents) => queued.is_ok(),
            next = framed.next() => {
                match next {
                    Some(Ok(_)) => warn!(
                        "RELAY | {} sent a frame before batch {} was acknowledged, closing connection",
                        peer, seq
                    ),
                    _ => debug!(
                        "RELAY | {} went away while batch {} was queued, batch discarded",
                        peer, seq
                    ),
                }
                break;
            }
        };
        if !queued {
            warn!(
                "RELAY | Index writer stopped, batch {} from {} not acknowledged",
                seq, peer
            );
            break;
        }
        let ack = match encode_ack(seq) {
            Ok(ack) => ack,
            Err(e) => {
                error!("RELAY | Failed to encode ack: {}", e);
                break;
            }
        };
        if let Err(e) = framed.send(ack).await {
            warn!("RELAY | Failed to acknowledge batch {} to {}: {}", seq, peer, e);
            break;
        }
        debug!("RELAY | Batch {} ({} events) from {} acknowledged", seq, count, peer);
    }
    debug!("RELAY | Connection from {} closed", peer);
}

/// Runs the chain on every document and routes the survivors.
async fn run_chain(
    context: &ConnectionContext,
    documents: Vec<serde_json::Map<String, serde_json::Value>>,
) -> Vec<BulkDocument> {
    let mut survivors = Vec::with_capacity(documents.len());
    for document in documents {
        PipelineCounters::incr(&context.counters.processed);
        match context.chain.run(PipelineEvent::from_document(document)).await {
            ChainResult::Forward(event) => {
                survivors.push(route(&context.index_prefix, event.into_document()));
            }
            ChainResult::Dropped {
                processor,
                reason,
                detail,
            } => {
                PipelineCounters::incr(&context.counters.filter_dropped);
                debug!("RELAY | Document dropped by {}: {}", processor, detail);
                publish(context.events.as_ref(), Event::RecordDropped { reason });
            }
        }
    }
    survivors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::processor::ProcessorConfig;
    use crate::logs::index::memory::InMemoryIndexStore;
    use crate::logs::transport::{encode_batch, RelayClient};

    fn config() -> Config {
        Config {
            relay_listen_addr: "127.0.0.1:0".to_string(),
            index_flush_interval: Duration::from_millis(10),
            index_backoff_base: Duration::from_millis(10),
            index_backoff_max: Duration::from_millis(20),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_relay_indexes_acknowledged_batches() {
        let store = Arc::new(InMemoryIndexStore::new());
        let relay = Relay::new(Arc::new(config()), store.clone(), None).unwrap();
        let running = relay.start(CancellationToken::new()).await.unwrap();

        let mut client =
            RelayClient::new(running.local_addr().to_string(), Duration::from_secs(5));
        let documents = vec![
            json!({"@timestamp": "2026-10-17T10:00:00Z", "message": "a", "tags": ["decode_error"]})
                .to_string(),
            json!({"message": "no timestamp"}).to_string(),
        ];
        client
            .send(encode_batch(1, &documents, 0).unwrap(), 1)
            .await
            .unwrap();

        let snapshot = running.shutdown().await;
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.indexed, 2);
        let dated = store.documents("logstash-2026.10.17").await;
        assert_eq!(dated[0]["tags"], json!(["decode_error"]));
        assert_eq!(store.documents("logstash-*").await.len(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_batch_is_not_queued() {
        let config = Config {
            relay_queue_capacity: 2,
            index_bulk_max_docs: 1,
            ..config()
        };
        let store = Arc::new(InMemoryIndexStore::new());
        store.set_available(false);
        let relay = Relay::new(Arc::new(config), store.clone(), None).unwrap();
        let running = relay.start(CancellationToken::new()).await.unwrap();
        let addr = running.local_addr().to_string();
        let batch = |seq: u64, names: &[&str]| {
            let documents: Vec<String> = names
                .iter()
                .map(|n| json!({"@timestamp": "2026-10-17T10:00:00Z", "message": n}).to_string())
                .collect();
            encode_batch(seq, &documents, 0).unwrap()
        };

        let mut first = RelayClient::new(addr.clone(), Duration::from_secs(5));
        first.send(batch(1, &["a0", "a1"]), 1).await.unwrap();

        // The queue has one free slot, so the second batch waits until
        // the client gives up and goes away.
        let mut second = RelayClient::new(addr.clone(), Duration::from_millis(200));
        assert!(second.send(batch(1, &["b0", "b1"]), 1).await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;

        store.set_available(true);
        let mut resent = RelayClient::new(addr, Duration::from_secs(5));
        resent.send(batch(1, &["b0", "b1"]), 1).await.unwrap();

        let snapshot = running.shutdown().await;
        assert_eq!(snapshot.indexed, 4);
        let messages: Vec<String> = store
            .documents("logstash-*")
            .await
            .iter()
            .map(|d| d["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, vec!["a0", "a1", "b0", "b1"]);
    }

    #[tokio::test]
    async fn test_relay_chain_drops_are_counted() {
        let config = Config {
            relay_processors: vec![ProcessorConfig::ExcludeAtMatch {
                name: "health".to_string(),
                pattern: "GET /health".to_string(),
            }],
            ..config()
        };
        let store = Arc::new(InMemoryIndexStore::new());
        let relay = Relay::new(Arc::new(config), store.clone(), None).unwrap();
        let running = relay.start(CancellationToken::new()).await.unwrap();

        let mut client =
            RelayClient::new(running.local_addr().to_string(), Duration::from_secs(5));
        let documents = vec![
            json!({"message": "GET /health 200"}).to_string(),
            json!({"message": "POST /orders 201"}).to_string(),
        ];
        client
            .send(encode_batch(5, &documents, 3).unwrap(), 5)
            .await
            .unwrap();

        let snapshot = running.shutdown().await;
        assert_eq!(snapshot.filter_dropped, 1);
        assert_eq!(snapshot.indexed, 1);
        assert_eq!(
            store.documents("logstash-*").await[0]["message"],
            json!("POST /orders 201")
        );
    }

    #[tokio::test]
    async fn test_relay_refuses_docker_metadata() {
        let config = Config {
            relay_processors: vec![ProcessorConfig::AddDockerMetadata {}],
            ..config()
        };
        let result = Relay::new(Arc::new(config), Arc::new(InMemoryIndexStore::new()), None);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_unbuffered_relay_requires_index_store() {
        let config = Config {
            relay_queue_capacity: 0,
            ..config()
        };
        let store = Arc::new(InMemoryIndexStore::new());
        store.set_available(false);
        let relay = Relay::new(Arc::new(config), store, None).unwrap();
        assert!(matches!(
            relay.start(CancellationToken::new()).await,
            Err(PipelineError::DownstreamUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_listen_address() {
        let config = Config {
            relay_listen_addr: "256.0.0.1:5044".to_string(),
            ..config()
        };
        let relay = Relay::new(Arc::new(config), Arc::new(InMemoryIndexStore::new()), None)
            .unwrap();
        assert!(matches!(
            relay.start(CancellationToken::new()).await,
            Err(PipelineError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = Config {
            relay_max_connections: 1,
            ..config()
        };
        let relay = Relay::new(Arc::new(config), Arc::new(InMemoryIndexStore::new()), None)
            .unwrap();
        let running = relay.start(CancellationToken::new()).await.unwrap();
        let addr = running.local_addr().to_string();

        let mut first = RelayClient::new(addr.clone(), Duration::from_secs(5));
        first
            .send(encode_batch(1, &[json!({"message": "x"}).to_string()], 0).unwrap(), 1)
            .await
            .unwrap();

        let mut second = RelayClient::new(addr, Duration::from_millis(200));
        let result = second
            .send(encode_batch(1, &[json!({"message": "y"}).to_string()], 0).unwrap(), 1)
            .await;
        assert!(result.is_err());

        let snapshot = running.shutdown().await;
        assert_eq!(snapshot.indexed, 1);
    }
}
