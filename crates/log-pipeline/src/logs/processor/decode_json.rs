// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Conditional decoding of a JSON message into the document.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::processor::{OverwritePolicy, ProcessorKind};
use crate::logs::event::{Marker, PipelineEvent};
use crate::logs::processor::{Outcome, Processor};

/// Owner label that has to be set for decoding to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub label: String,
    pub value: String,
}

/// Parses `source_field` as a JSON object and merges its top-level keys into
/// `target` (the document root when `None`).
///
/// A failed decode leaves the document untouched and flags `decode_error`;
/// it never drops the event. Owners without the trigger label keep their
/// message verbatim.
#[derive(Debug, Clone)]
pub struct DecodeJsonFields {
    trigger: Option<Trigger>,
    source_field: String,
    target: Option<String>,
    overwrite_policy: OverwritePolicy,
}

impl DecodeJsonFields {
    #[must_use]
    pub fn new(
        trigger: Option<Trigger>,
        source_field: impl Into<String>,
        target: Option<String>,
        overwrite_policy: OverwritePolicy,
    ) -> Self {
        DecodeJsonFields {
            trigger,
            source_field: source_field.into(),
            target,
            overwrite_policy,
        }
    }

    fn triggered(&self, event: &PipelineEvent) -> bool {
        match &self.trigger {
            None => true,
            Some(trigger) => event.label(&trigger.label) == Some(trigger.value.as_str()),
        }
    }

    fn merge(&self, scope: &mut Map<String, Value>, decoded: Map<String, Value>) {
        for (key, value) in decoded {
            match self.overwrite_policy {
                OverwritePolicy::Overwrite => {
                    scope.insert(key, value);
                }
                OverwritePolicy::PreserveExisting => {
                    scope.entry(key).or_insert(value);
                }
            }
        }
    }

    fn decode_error(event: PipelineEvent, warning: String) -> Outcome {
        Outcome::Unchanged(event.with_marker(Marker::DecodeError), Some(warning))
    }
}

#[async_trait]
impl Processor for DecodeJsonFields {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DecodeJsonFields
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        if !self.triggered(&event) {
            return Outcome::Unchanged(event, None);
        }

        let decoded = match event.document.get(&self.source_field) {
            Some(Value::String(text)) => serde_json::from_str::<Value>(text.trim()),
            Some(_) => {
                let warning = format!("field '{}' is not text", self.source_field);
                return Self::decode_error(event, warning);
            }
            None => {
                let warning = format!("field '{}' is missing", self.source_field);
                return Self::decode_error(event, warning);
            }
        };
        let decoded = match decoded {
            Ok(Value::Object(decoded)) => decoded,
            Ok(other) => {
                let warning = format!(
                    "field '{}' decoded to a non-object value {}",
                    self.source_field,
                    json_type(&other)
                );
                return Self::decode_error(event, warning);
            }
            Err(e) => {
                let warning = format!("field '{}' is not JSON: {}", self.source_field, e);
                return Self::decode_error(event, warning);
            }
        };

        let mut document = event.document.clone();
        match &self.target {
            None => self.merge(&mut document, decoded),
            Some(target) => {
                let scope = document
                    .entry(target.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !scope.is_object() {
                    if self.overwrite_policy == OverwritePolicy::PreserveExisting {
                        let warning = format!("target '{target}' exists and is not an object");
                        return Self::decode_error(event, warning);
                    }
                    *scope = Value::Object(Map::new());
                }
                if let Value::Object(scope) = scope {
                    self.merge(scope, decoded);
                }
            }
        }
        Outcome::Enriched(event.with_document(document))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::logs::capture::OwnerMetadata;
    use crate::logs::processor::test_support::event_with;

    fn decoder(policy: OverwritePolicy, target: Option<&str>) -> DecodeJsonFields {
        DecodeJsonFields::new(
            Some(Trigger {
                label: "decode".to_string(),
                value: "true".to_string(),
            }),
            "message",
            target.map(str::to_string),
            policy,
        )
    }

    fn triggered_owner() -> OwnerMetadata {
        OwnerMetadata::new("o").with_label("decode", "true")
    }

    #[tokio::test]
    async fn test_decodes_into_root() {
        let event = event_with(r#"{"user":"x","level":"INFO"}"#, triggered_owner());
        let Outcome::Enriched(event) = decoder(OverwritePolicy::Overwrite, None)
            .process(event)
            .await
        else {
            panic!("expected enrichment");
        };
        assert_eq!(event.document["user"], json!("x"));
        assert_eq!(event.document["level"], json!("INFO"));
        assert!(event.markers.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_policy_on_collision() {
        let mut event = event_with(r#"{"user":"x"}"#, triggered_owner());
        event
            .document
            .insert("user".to_string(), json!("existing"));

        let Outcome::Enriched(overwritten) = decoder(OverwritePolicy::Overwrite, None)
            .process(event.clone())
            .await
        else {
            panic!("expected enrichment");
        };
        assert_eq!(overwritten.document["user"], json!("x"));

        let Outcome::Enriched(preserved) = decoder(OverwritePolicy::PreserveExisting, None)
            .process(event)
            .await
        else {
            panic!("expected enrichment");
        };
        assert_eq!(preserved.document["user"], json!("existing"));
    }

    #[tokio::test]
    async fn test_untriggered_message_is_kept_verbatim() {
        let owner = OwnerMetadata::new("o").with_label("decode", "false");
        let event = event_with(r#"{"user":"x"}"#, owner);
        match decoder(OverwritePolicy::Overwrite, None).process(event).await {
            Outcome::Unchanged(event, None) => {
                assert_eq!(event.message(), Some(r#"{"user":"x"}"#));
                assert!(!event.document.contains_key("user"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_flags_decode_error() {
        let event = event_with("plain text line", triggered_owner());
        match decoder(OverwritePolicy::Overwrite, None).process(event).await {
            Outcome::Unchanged(event, Some(_)) => {
                assert!(event.has_marker(Marker::DecodeError));
                assert_eq!(event.message(), Some("plain text line"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let event = event_with("[1,2]", triggered_owner());
        assert!(matches!(
            decoder(OverwritePolicy::Overwrite, None).process(event).await,
            Outcome::Unchanged(e, Some(_)) if e.has_marker(Marker::DecodeError)
        ));
    }

    #[tokio::test]
    async fn test_decodes_into_nested_target() {
        let event = event_with(r#"{"user":"x"}"#, triggered_owner());
        let Outcome::Enriched(event) = decoder(OverwritePolicy::Overwrite, Some("json"))
            .process(event)
            .await
        else {
            panic!("expected enrichment");
        };
        assert_eq!(event.document["json"]["user"], json!("x"));
        assert_eq!(event.message(), Some(r#"{"user":"x"}"#));
    }

    #[tokio::test]
    async fn test_preserve_existing_non_object_target() {
        let mut event = event_with(r#"{"user":"x"}"#, triggered_owner());
        event.document.insert("json".to_string(), json!("scalar"));
        assert!(matches!(
            decoder(OverwritePolicy::PreserveExisting, Some("json"))
                .process(event)
                .await,
            Outcome::Unchanged(e, Some(_)) if e.document["json"] == json!("scalar")
        ));
    }

    #[tokio::test]
    async fn test_without_trigger_always_decodes() {
        let decoder = DecodeJsonFields::new(None, "message", None, OverwritePolicy::Overwrite);
        let event = event_with(r#"{"user":"x"}"#, OwnerMetadata::new("o"));
        assert!(matches!(
            decoder.process(event).await,
            Outcome::Enriched(_)
        ));
    }
}
