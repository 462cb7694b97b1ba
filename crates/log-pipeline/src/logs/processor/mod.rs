// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Processor chains.
//!
//! A chain is an ordered list of processors built once at startup from typed
//! descriptors (see [`crate::config::processor`]) through the
//! [`registry::ProcessorRegistry`]. Every record goes through the processors
//! in configured order:
//!
//! ```text
//!   PipelineEvent ──> [p1] ──> [p2] ──> ... ──> [pN] ──> forwarded
//!                       │        │                │
//!                       └────────┴── Dropped ─────┘ (short-circuit)
//! ```
//!
//! Processors receive the event by value and hand back a new version inside
//! an [`Outcome`]. Soft failures are outcomes too: a processor that could not
//! do its job returns `Unchanged` with a warning (and usually a marker), never
//! an error.

pub mod correlation;
pub mod decode_json;
pub mod docker_metadata;
pub mod fields;
pub mod label_filter;
pub mod registry;
pub mod rules;

use async_trait::async_trait;
use tracing::debug;

use crate::config::processor::ProcessorKind;
use crate::event_bus::DropReason;
use crate::logs::event::PipelineEvent;

/// Result of running one processor on one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The processor changed the event.
    Enriched(PipelineEvent),
    /// The event passed through as is; the warning says why when the
    /// processor could not do its work.
    Unchanged(PipelineEvent, Option<String>),
    /// Terminal: the event leaves the pipeline.
    Dropped { reason: DropReason, detail: String },
}

#[async_trait]
pub trait Processor: Send + Sync {
    fn kind(&self) -> ProcessorKind;

    async fn process(&self, event: PipelineEvent) -> Outcome;
}

/// What came out of the end of a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainResult {
    Forward(PipelineEvent),
    Dropped {
        processor: ProcessorKind,
        reason: DropReason,
        detail: String,
    },
}

#[derive(Default)]
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    #[must_use]
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        ProcessorChain { processors }
    }

    /// A chain that forwards everything untouched.
    #[must_use]
    pub fn pass_through() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ProcessorKind> {
        self.processors.iter().map(|p| p.kind()).collect()
    }

    pub async fn run(&self, event: PipelineEvent) -> ChainResult {
        let mut event = event;
        for processor in &self.processors {
            event = match processor.process(event).await {
                Outcome::Enriched(next) => next,
                Outcome::Unchanged(next, warning) => {
                    if let Some(warning) = warning {
                        debug!("PROCESSOR | {}: {}", processor.kind(), warning);
                    }
                    next
                }
                Outcome::Dropped { reason, detail } => {
                    return ChainResult::Dropped {
                        processor: processor.kind(),
                        reason,
                        detail,
                    };
                }
            };
        }
        ChainResult::Forward(event)
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::test_support::event_with;
    use super::*;
    use crate::logs::capture::OwnerMetadata;
    use crate::logs::event::Marker;

    struct Recording {
        kind: ProcessorKind,
        calls: Arc<AtomicUsize>,
        outcome: fn(PipelineEvent) -> Outcome,
    }

    #[async_trait]
    impl Processor for Recording {
        fn kind(&self) -> ProcessorKind {
            self.kind
        }

        async fn process(&self, event: PipelineEvent) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(event)
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_and_short_circuits() {
        let first = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let chain = ProcessorChain::new(vec![
            Box::new(Recording {
                kind: ProcessorKind::ValidateCorrelation,
                calls: first.clone(),
                outcome: |e| Outcome::Enriched(e.with_marker(Marker::LevelMismatch)),
            }),
            Box::new(Recording {
                kind: ProcessorKind::LabelFilter,
                calls: Arc::new(AtomicUsize::new(0)),
                outcome: |_| Outcome::Dropped {
                    reason: DropReason::Admission,
                    detail: "no label".to_string(),
                },
            }),
            Box::new(Recording {
                kind: ProcessorKind::DropFields,
                calls: last.clone(),
                outcome: |e| Outcome::Unchanged(e, None),
            }),
        ]);

        let result = chain.run(event_with("m", OwnerMetadata::new("o"))).await;
        assert_eq!(
            result,
            ChainResult::Dropped {
                processor: ProcessorKind::LabelFilter,
                reason: DropReason::Admission,
                detail: "no label".to_string(),
            }
        );
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_of_one_processor_is_input_of_next() {
        let chain = ProcessorChain::new(vec![
            Box::new(Recording {
                kind: ProcessorKind::ValidateCorrelation,
                calls: Arc::new(AtomicUsize::new(0)),
                outcome: |e| Outcome::Enriched(e.with_marker(Marker::DecodeError)),
            }),
            Box::new(Recording {
                kind: ProcessorKind::ValidateCorrelation,
                calls: Arc::new(AtomicUsize::new(0)),
                outcome: |e| {
                    assert!(e.has_marker(Marker::DecodeError));
                    Outcome::Unchanged(e, Some("seen".to_string()))
                },
            }),
        ]);

        match chain.run(event_with("m", OwnerMetadata::new("o"))).await {
            ChainResult::Forward(event) => assert!(event.has_marker(Marker::DecodeError)),
            ChainResult::Dropped { .. } => panic!("unexpected drop"),
        }
    }

    #[tokio::test]
    async fn test_pass_through() {
        let chain = ProcessorChain::pass_through();
        assert!(chain.is_empty());
        let event = event_with("m", OwnerMetadata::new("o"));
        assert_eq!(chain.run(event.clone()).await, ChainResult::Forward(event));
    }
}
