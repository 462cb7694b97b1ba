// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Owner enrichment from the container runtime.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::processor::ProcessorKind;
use crate::logs::event::{Marker, PipelineEvent};
use crate::logs::metadata::MetadataResolver;
use crate::logs::processor::{Outcome, Processor};

/// Fills in `owner` (name, image, labels) from the runtime. When the owner
/// cannot be resolved in time the event is forwarded as is, flagged
/// `metadata_incomplete`.
pub struct AddDockerMetadata {
    resolver: Arc<MetadataResolver>,
}

impl AddDockerMetadata {
    #[must_use]
    pub fn new(resolver: Arc<MetadataResolver>) -> Self {
        AddDockerMetadata { resolver }
    }
}

#[async_trait]
impl Processor for AddDockerMetadata {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::AddDockerMetadata
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        match self.resolver.resolve(&event.owner.id).await {
            Some(resolved) => {
                let mut owner = event.owner.clone();
                owner.merge_from(&resolved);
                Outcome::Enriched(event.with_owner(owner))
            }
            None => {
                let warning = format!("metadata for owner {} unresolved", event.owner.id);
                Outcome::Unchanged(event.with_marker(Marker::MetadataIncomplete), Some(warning))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::logs::capture::OwnerMetadata;
    use crate::logs::metadata::MetadataRegistry;
    use crate::logs::processor::test_support::event_with;

    fn processor(registry: &MetadataRegistry) -> AddDockerMetadata {
        AddDockerMetadata::new(Arc::new(MetadataResolver::new(
            Arc::new(registry.clone()),
            Duration::from_millis(20),
            Duration::from_millis(5),
        )))
    }

    #[tokio::test]
    async fn test_enriches_owner_and_keeps_fields() {
        let registry = MetadataRegistry::new();
        registry
            .register(
                OwnerMetadata::new("o1")
                    .with_name("user-service")
                    .with_image("svc:1")
                    .with_label("admit", "true"),
            )
            .await;

        let event = event_with("hello", OwnerMetadata::new("o1"));
        let before: Vec<String> = event.document.keys().cloned().collect();

        let Outcome::Enriched(enriched) = processor(&registry).process(event).await else {
            panic!("expected enrichment");
        };
        assert_eq!(enriched.label("admit"), Some("true"));
        assert_eq!(enriched.document["owner"]["name"], json!("user-service"));
        assert_eq!(enriched.document["owner"]["image"], json!("svc:1"));
        for key in before {
            assert!(enriched.document.contains_key(&key));
        }
        assert!(enriched.markers.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_is_flagged_not_dropped() {
        let registry = MetadataRegistry::new();
        let event = event_with("hello", OwnerMetadata::new("ghost").with_label("admit", "true"));

        match processor(&registry).process(event).await {
            Outcome::Unchanged(event, Some(_)) => {
                assert!(event.has_marker(Marker::MetadataIncomplete));
                assert_eq!(event.label("admit"), Some("true"));
                assert_eq!(event.message(), Some("hello"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
