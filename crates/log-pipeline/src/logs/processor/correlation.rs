// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Data-quality checks on the record's correlation and level fields.

use async_trait::async_trait;

use crate::config::processor::ProcessorKind;
use crate::logs::event::{Marker, PipelineEvent};
use crate::logs::processor::{Outcome, Processor};
use crate::logs::record::{correlation_state, level_mismatch, CorrelationState};

/// Flags `correlation_partial` when a record carries some but not all of the
/// trace identity, and `level_mismatch` when `level_value` disagrees with
/// `level`. Fields are never completed or removed; the event is always
/// forwarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateCorrelation;

#[async_trait]
impl Processor for ValidateCorrelation {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::ValidateCorrelation
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        let mut warnings = Vec::new();
        let mut event = event;

        if correlation_state(&event.document) == CorrelationState::Partial {
            warnings.push("partial correlation fields");
            event = event.with_marker(Marker::CorrelationPartial);
        }
        if level_mismatch(&event.document) {
            warnings.push("level_value does not match level");
            event = event.with_marker(Marker::LevelMismatch);
        }

        if warnings.is_empty() {
            Outcome::Unchanged(event, None)
        } else {
            let warning = format!("owner {}: {}", event.owner.id, warnings.join(", "));
            Outcome::Unchanged(event, Some(warning))
        }
    }
}
