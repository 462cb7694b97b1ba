// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::event_bus::{publish, DropReason, Event};
use crate::logs::capture::CaptureEnvelope;
use crate::logs::collector::tailer::{Line, Tailer};
use crate::logs::counters::PipelineCounters;
use crate::logs::event::{Marker, PipelineEvent};
use crate::logs::processor::{ChainResult, ProcessorChain};

/// Tails one owner's capture file and runs every line through the chain,
/// strictly one line at a time.
pub struct Worker {
    owner_id: String,
    tailer: Tailer,
    chain: Arc<ProcessorChain>,
    tx: mpsc::Sender<String>,
    counters: Arc<PipelineCounters>,
    events: Option<Sender<Event>>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
    retire: CancellationToken,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        owner_id: String,
        tailer: Tailer,
        chain: Arc<ProcessorChain>,
        tx: mpsc::Sender<String>,
        counters: Arc<PipelineCounters>,
        events: Option<Sender<Event>>,
        poll_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Worker {
            owner_id,
            tailer,
            chain,
            tx,
            counters,
            events,
            poll_interval,
            cancel_token,
            retire: CancellationToken::new(),
        }
    }

    /// Once `retire` fires the worker reads what is left of the file and
    /// stops at end of file.
    #[must_use]
    pub fn with_retirement(mut self, retire: CancellationToken) -> Self {
        self.retire = retire;
        self
    }

    pub async fn spin(mut self) {
        while !self.cancel_token.is_cancelled() {
            let retiring = self.retire.is_cancelled();
            match self.tailer.read_lines().await {
                Ok(lines) if !lines.is_empty() => {
                    // Lines already read are finished even if shutdown was
                    // requested in the meantime.
                    for line in lines {
                        self.process(line).await;
                    }
                    continue;
                }
                Ok(_) if retiring => {
                    debug!("COLLECTOR | Worker for owner {} retired at end of file", self.owner_id);
                    return;
                }
                Ok(_) => {}
                Err(e) if retiring => {
                    warn!(
                        "COLLECTOR | Failed to read {} while retiring: {}",
                        self.tailer.path().display(),
                        e
                    );
                    return;
                }
                Err(e) => warn!(
                    "COLLECTOR | Failed to read {}: {}",
                    self.tailer.path().display(),
                    e
                ),
            }
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = self.retire.cancelled(), if !retiring => {}
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        debug!("COLLECTOR | Worker for owner {} stopped", self.owner_id);
    }

    async fn process(&self, line: Line) {
        if line.bytes.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        PipelineCounters::incr(&self.counters.processed);

        if line.truncated {
            error!(
                "COLLECTOR | Dropping capture line of owner {} over the {} byte limit",
                self.owner_id,
                line.bytes.len()
            );
            self.drop_malformed();
            return;
        }
        let envelope = match CaptureEnvelope::parse_line(&line.bytes, Some(&self.owner_id)) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(
                    "COLLECTOR | Dropping malformed capture line of owner {}: {}",
                    self.owner_id, e
                );
                self.drop_malformed();
                return;
            }
        };

        match self.chain.run(PipelineEvent::from_envelope(envelope)).await {
            ChainResult::Forward(event) => self.forward(event).await,
            ChainResult::Dropped {
                processor,
                reason,
                detail,
            } => {
                let counter = match reason {
                    DropReason::Admission => &self.counters.admission_dropped,
                    DropReason::Malformed => &self.counters.malformed,
                    DropReason::Filter | DropReason::Rejected => &self.counters.filter_dropped,
                };
                PipelineCounters::incr(counter);
                debug!(
                    "COLLECTOR | Record of owner {} dropped by {}: {}",
                    self.owner_id, processor, detail
                );
                publish(self.events.as_ref(), Event::RecordDropped { reason });
            }
        }
    }

    async fn forward(&self, event: PipelineEvent) {
        for (marker, counter) in [
            (Marker::DecodeError, &self.counters.decode_errors),
            (Marker::MetadataIncomplete, &self.counters.metadata_incomplete),
            (Marker::CorrelationPartial, &self.counters.correlation_partial),
        ] {
            if event.has_marker(marker) {
                PipelineCounters::incr(counter);
            }
        }
        let document = Value::Object(event.into_document()).to_string();
        if self.tx.send(document).await.is_err() {
            warn!(
                "COLLECTOR | Forwarder is gone, record of owner {} lost",
                self.owner_id
            );
            PipelineCounters::incr(&self.counters.lost);
            publish(self.events.as_ref(), Event::RecordsLost { count: 1 });
        }
    }

    fn drop_malformed(&self) {
        PipelineCounters::incr(&self.counters.malformed);
        publish(
            self.events.as_ref(),
            Event::RecordDropped {
                reason: DropReason::Malformed,
            },
        );
    }
}
