// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Collector-side buffer of serialized documents waiting for the relay.
//!
//! Documents are kept in arrival order. While the relay is unavailable the
//! spool keeps accepting documents until `capacity` is reached; after that
//! the oldest documents are evicted (FIFO) and reported as lost. A spool
//! created with capacity `0` does no buffering of its own: it holds at most
//! one batch and refuses more until that batch has been delivered, which
//! pushes back on the collector workers instead of losing records.

use std::collections::VecDeque;

use tracing::warn;

use crate::logs::constants;

#[derive(Debug, Clone)]
pub struct Spool {
    entries: VecDeque<String>,
    bytes: usize,
    capacity: usize,
    evict_oldest: bool,
    max_batch_events: usize,
    max_batch_bytes: usize,
}

impl Default for Spool {
    fn default() -> Self {
        Spool::new(
            constants::DEFAULT_SPOOL_CAPACITY,
            constants::MAX_BATCH_ENTRIES_SIZE,
            constants::MAX_CONTENT_SIZE_BYTES,
        )
    }
}

impl Spool {
    #[must_use]
    pub fn new(capacity: usize, max_batch_events: usize, max_batch_bytes: usize) -> Self {
        let (capacity, evict_oldest) = if capacity == 0 {
            (max_batch_events.max(1), false)
        } else {
            (capacity, true)
        };
        Spool {
            entries: VecDeque::new(),
            bytes: 0,
            capacity,
            evict_oldest,
            max_batch_events: max_batch_events.max(1),
            max_batch_bytes,
        }
    }

    /// Whether the spool was configured without buffering.
    #[must_use]
    pub fn is_unbuffered(&self) -> bool {
        !self.evict_oldest
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `push` can be called without evicting or exceeding an
    /// unbuffered spool's single batch.
    #[must_use]
    pub fn accepts(&self) -> bool {
        self.evict_oldest || self.entries.len() < self.capacity
    }

    /// A full batch is waiting; there is no reason to wait for the flush timer.
    #[must_use]
    pub fn is_batch_ready(&self) -> bool {
        self.entries.len() >= self.max_batch_events || self.bytes >= self.max_batch_bytes
    }

    /// Appends a document and returns how many documents were evicted to
    /// make room for it.
    pub fn push(&mut self, document: String) -> usize {
        let mut evicted = 0;
        while self.entries.len() >= self.capacity {
            match self.entries.pop_front() {
                Some(oldest) => {
                    self.bytes -= oldest.len();
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            warn!(
                "COLLECTOR | Spool full ({} items), dropped {} oldest record(s)",
                self.capacity, evicted
            );
        }
        self.bytes += document.len();
        self.entries.push_back(document);
        evicted
    }

    /// Takes the next batch from the front of the spool, bounded by the
    /// configured number of events and bytes. A single document larger than
    /// the byte limit is still returned, alone, so the spool never stalls.
    pub fn get_batch(&mut self) -> Vec<String> {
        let mut batch = Vec::new();
        let mut batch_bytes = 0;
        while batch.len() < self.max_batch_events {
            let Some(document) = self.entries.pop_front() else {
                break;
            };
            // +1 for the separator in the encoded frame
            if !batch.is_empty() && batch_bytes + document.len() + 1 > self.max_batch_bytes {
                self.entries.push_front(document);
                break;
            }
            self.bytes -= document.len();
            batch_bytes += document.len() + 1;
            batch.push(document);
        }
        batch
    }

    /// Empties the spool, returning how many documents it held.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.bytes = 0;
        count
    }
}
