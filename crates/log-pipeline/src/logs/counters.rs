// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline counters.
//!
//! Admission drops are intentional and are kept apart from failures, so a
//! high `admission_dropped` count never looks like an incident.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub processed: AtomicU64,
    pub forwarded: AtomicU64,
    pub admission_dropped: AtomicU64,
    pub filter_dropped: AtomicU64,
    pub malformed: AtomicU64,
    pub decode_errors: AtomicU64,
    pub metadata_incomplete: AtomicU64,
    pub correlation_partial: AtomicU64,
    /// Records discarded because a bounded buffer overflowed or could not be
    /// delivered before shutdown.
    pub lost: AtomicU64,
    pub indexed: AtomicU64,
    /// Documents the index store refused permanently (mapping errors).
    pub rejected: AtomicU64,
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub processed: u64,
    pub forwarded: u64,
    pub admission_dropped: u64,
    pub filter_dropped: u64,
    pub malformed: u64,
    pub decode_errors: u64,
    pub metadata_incomplete: u64,
    pub correlation_partial: u64,
    pub lost: u64,
    pub indexed: u64,
    pub rejected: u64,
}

impl PipelineCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            admission_dropped: self.admission_dropped.load(Ordering::Relaxed),
            filter_dropped: self.filter_dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            metadata_incomplete: self.metadata_incomplete.load(Ordering::Relaxed),
            correlation_partial: self.correlation_partial.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
