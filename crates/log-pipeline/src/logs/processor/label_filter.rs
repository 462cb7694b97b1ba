// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Admission control by owner label.

use async_trait::async_trait;

use crate::config::processor::ProcessorKind;
use crate::event_bus::DropReason;
use crate::logs::event::PipelineEvent;
use crate::logs::processor::{Outcome, Processor};

/// Keeps an event only when `owner.labels[label] == value`. A missing label
/// never matches, so owners are excluded unless they opt in.
#[derive(Debug, Clone)]
pub struct LabelFilter {
    label: String,
    value: String,
}

impl LabelFilter {
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        LabelFilter {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Processor for LabelFilter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::LabelFilter
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        if event.label(&self.label) == Some(self.value.as_str()) {
            return Outcome::Unchanged(event, None);
        }
        let detail = match event.label(&self.label) {
            Some(value) => format!(
                "owner {} has {}={}, expected {}",
                event.owner.id, self.label, value, self.value
            ),
            None => format!("owner {} has no {} label", event.owner.id, self.label),
        };
        Outcome::Dropped {
            reason: DropReason::Admission,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::capture::OwnerMetadata;
    use crate::logs::processor::test_support::event_with;

    #[tokio::test]
    async fn test_admits_only_matching_owner() {
        let filter = LabelFilter::new("admit", "true");

        let admitted = event_with("m", OwnerMetadata::new("a").with_label("admit", "true"));
        assert!(matches!(
            filter.process(admitted).await,
            Outcome::Unchanged(_, None)
        ));

        let refused = event_with("m", OwnerMetadata::new("b").with_label("admit", "false"));
        assert!(matches!(
            filter.process(refused).await,
            Outcome::Dropped {
                reason: DropReason::Admission,
                ..
            }
        ));

        let unlabeled = event_with("m", OwnerMetadata::new("c"));
        assert!(matches!(
            filter.process(unlabeled).await,
            Outcome::Dropped {
                reason: DropReason::Admission,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_value_comparison_is_exact() {
        let filter = LabelFilter::new("admit", "true");
        let event = event_with("m", OwnerMetadata::new("a").with_label("admit", "TRUE"));
        assert!(matches!(
            filter.process(event).await,
            Outcome::Dropped { .. }
        ));
    }
}
