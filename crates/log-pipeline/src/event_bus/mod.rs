// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Simple event bus for pipeline observers.
//!
//! Collector and relay components publish what happened to records (batches
//! acknowledged, documents indexed, records dropped or lost) so that the
//! binaries, or a test, can observe the pipeline without reaching into it.
//!
//! ```text
//! Producers (many)           EventBus          Consumer (one)
//!     ├─ RecordsForwarded ─────>│                   │
//!     ├─ RecordDropped ────────>│ ──> MPSC ───────> rx
//!     ├─ SpoolEvicted ─────────>│     channel       │
//!     └─ Tombstone ────────────>│                   │
//! ```

use tokio::sync::mpsc::{self, Sender};
use tracing::debug;

use crate::event_bus::constants::MAX_EVENTS;

mod constants;

/// Why a record left the pipeline before reaching the index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The owner did not opt in through the admission label.
    Admission,
    /// A configured filter (rule or relay chain) removed it.
    Filter,
    /// The capture line could not be parsed as an envelope.
    Malformed,
    /// The index store refused the document permanently.
    Rejected,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// A batch was acknowledged by the relay.
    RecordsForwarded { count: usize },
    /// A bulk request was accepted by the index store.
    RecordsIndexed { count: usize },
    RecordDropped { reason: DropReason },
    /// The collector spool was full and its oldest records were discarded.
    SpoolEvicted { count: usize },
    /// Documents still queued when the relay gave up on the index at shutdown.
    RecordsLost { count: usize },
    /// Shutdown signal for the consumer.
    Tombstone,
}

#[allow(clippy::module_name_repetitions)]
pub struct EventBus {
    pub rx: mpsc::Receiver<Event>,
}

impl EventBus {
    #[must_use]
    pub fn run() -> (EventBus, Sender<Event>) {
        let (tx, rx) = mpsc::channel(MAX_EVENTS);
        let event_bus = EventBus { rx };
        (event_bus, tx)
    }
}

/// Publishes an event without waiting; a full or closed bus only loses the
/// notification, never the record it describes.
pub fn publish(tx: Option<&Sender<Event>>, event: Event) {
    if let Some(tx) = tx {
        if let Err(e) = tx.try_send(event) {
            debug!("EVENT_BUS | Dropping event {:?}: {}", event, e);
        }
    }
}
