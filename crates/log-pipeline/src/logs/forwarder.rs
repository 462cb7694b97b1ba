// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Delivery of collector output to the relay.
//!
//! A single forwarder task owns the spool and the relay connection, so
//! documents leave in the order workers produced them.
//!
//! ```text
//!   workers ──> mpsc ──> Spool ──> in-flight batch ──> RelayClient ──> ack
//!                          ▲              │
//!                          │         no ack: keep the frame,
//!                     FIFO eviction   back off, send it again
//! ```
//!
//! A batch is encoded once and kept until the relay acknowledges it; retries
//! resend those exact bytes. Nothing newer is sent while a batch is in
//! flight, which keeps per-owner order intact across reconnects.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, Sender};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::event_bus::{publish, Event};
use crate::logs::backoff::Backoff;
use crate::logs::counters::PipelineCounters;
use crate::logs::spool::Spool;
use crate::logs::transport::{encode_batch, RelayClient, TransportError};

struct InFlight {
    seq: u64,
    count: usize,
    frame: Bytes,
}

pub struct Forwarder {
    rx: mpsc::Receiver<String>,
    spool: Spool,
    client: RelayClient,
    compression_level: i32,
    flush_interval: Duration,
    backoff: Backoff,
    shutdown_attempts: usize,
    counters: Arc<PipelineCounters>,
    events: Option<Sender<Event>>,
    cancel: CancellationToken,
    next_seq: u64,
    in_flight: Option<InFlight>,
    retry_at: Option<Instant>,
    last_flush: Instant,
    // cancellation observed
    stopping: bool,
    // every sender is gone
    closed: bool,
    failures_while_stopping: usize,
}

impl Forwarder {
    #[must_use]
    pub fn new(
        config: &Config,
        rx: mpsc::Receiver<String>,
        counters: Arc<PipelineCounters>,
        events: Option<Sender<Event>>,
        cancel: CancellationToken,
    ) -> Self {
        Forwarder {
            rx,
            spool: Spool::new(
                config.collector_spool_capacity,
                config.collector_batch_max_events,
                config.collector_batch_max_bytes,
            ),
            client: RelayClient::new(
                config.collector_relay_addr.clone(),
                config.collector_ack_timeout,
            ),
            compression_level: config.collector_compression_level,
            flush_interval: config.collector_flush_interval,
            backoff: Backoff::new(config.collector_backoff_base, config.collector_backoff_max),
            shutdown_attempts: config.collector_shutdown_attempts.max(1),
            counters,
            events,
            cancel,
            next_seq: 1,
            in_flight: None,
            retry_at: None,
            last_flush: Instant::now(),
            stopping: false,
            closed: false,
            failures_while_stopping: 0,
        }
    }

    /// Opens the relay connection ahead of time. Used at startup when
    /// buffering is disabled and the relay is mandatory.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.client.connect().await
    }

    #[must_use]
    pub fn relay_addr(&self) -> &str {
        self.client.addr()
    }

    fn has_work(&self) -> bool {
        self.in_flight.is_some() || !self.spool.is_empty()
    }

    fn next_flush_at(&self) -> Option<Instant> {
        if !self.has_work() {
            return None;
        }
        if self.stopping || self.closed {
            return Some(Instant::now());
        }
        if let Some(retry_at) = self.retry_at {
            return Some(retry_at);
        }
        if self.in_flight.is_some() || self.spool.is_batch_ready() {
            return Some(Instant::now());
        }
        Some(self.last_flush + self.flush_interval)
    }

    pub async fn run(mut self) {
        loop {
            if self.closed && !self.has_work() {
                break;
            }
            let flush_at = self.next_flush_at();
            let accepting = !self.closed && self.spool.accepts();
            tokio::select! {
                () = self.cancel.cancelled(), if !self.stopping => {
                    debug!("COLLECTOR | Forwarder draining");
                    self.stopping = true;
                }
                received = self.rx.recv(), if accepting => match received {
                    Some(document) => self.enqueue(document),
                    None => self.closed = true,
                },
                () = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    if !self.flush().await && (self.stopping || self.closed) {
                        self.failures_while_stopping += 1;
                        if self.failures_while_stopping >= self.shutdown_attempts {
                            self.abandon();
                            break;
                        }
                    }
                }
                else => break,
            }
        }
        debug!("COLLECTOR | Forwarder stopped");
    }

    fn enqueue(&mut self, document: String) {
        let evicted = self.spool.push(document);
        if evicted > 0 {
            PipelineCounters::add(&self.counters.lost, evicted);
            publish(self.events.as_ref(), Event::SpoolEvicted { count: evicted });
        }
    }

    /// One delivery attempt. Returns whether there is nothing left to retry.
    async fn flush(&mut self) -> bool {
        let batch = match self.in_flight.take() {
            Some(batch) => batch,
            None => {
                let documents = self.spool.get_batch();
                if documents.is_empty() {
                    return true;
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                match encode_batch(seq, &documents, self.compression_level) {
                    Ok(frame) => InFlight {
                        seq,
                        count: documents.len(),
                        frame,
                    },
                    Err(e) => {
                        error!(
                            "COLLECTOR | Failed to encode batch {}, {} record(s) lost: {}",
                            seq,
                            documents.len(),
                            e
                        );
                        self.report_lost(documents.len());
                        return true;
                    }
                }
            }
        };

        let started = Instant::now();
        match self.client.send(batch.frame.clone(), batch.seq).await {
            Ok(()) => {
                debug!(
                    "COLLECTOR | Batch {} ({} records) acknowledged in {} ms",
                    batch.seq,
                    batch.count,
                    started.elapsed().as_millis()
                );
                PipelineCounters::add(&self.counters.forwarded, batch.count);
                publish(
                    self.events.as_ref(),
                    Event::RecordsForwarded { count: batch.count },
                );
                self.backoff.reset();
                self.retry_at = None;
                self.last_flush = Instant::now();
                true
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    "COLLECTOR | Failed to deliver batch {} to relay {} (attempt {}): {}, retrying in {:?}",
                    batch.seq,
                    self.client.addr(),
                    self.backoff.attempts(),
                    e,
                    delay
                );
                self.in_flight = Some(batch);
                self.retry_at = Some(Instant::now() + delay);
                false
            }
        }
    }

    /// Gives up on everything still held, including documents workers are
    /// trying to hand over.
    fn abandon(&mut self) {
        self.rx.close();
        let mut lost = self.in_flight.take().map_or(0, |b| b.count) + self.spool.clear();
        while self.rx.try_recv().is_ok() {
            lost += 1;
        }
        if lost > 0 {
            error!(
                "COLLECTOR | Relay {} unavailable at shutdown after {} attempts, {} record(s) lost",
                self.client.addr(),
                self.shutdown_attempts,
                lost
            );
            self.report_lost(lost);
        }
    }

    fn report_lost(&self, count: usize) {
        PipelineCounters::add(&self.counters.lost, count);
        publish(self.events.as_ref(), Event::RecordsLost { count });
    }
}
