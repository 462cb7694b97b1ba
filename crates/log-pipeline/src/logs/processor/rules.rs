// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Regex message rules.
//!
//! Three kinds of rule operate on the document's `message`:
//!
//! 1. **`exclude_at_match`**: drop the event when the pattern matches
//! 2. **`include_at_match`**: drop the event when the pattern does not match
//! 3. **`mask_sequences`**: replace every match with a placeholder
//!
//! ```yaml
//! relay:
//!   processors:
//!     - type: exclude_at_match
//!       name: health_checks
//!       pattern: "GET /actuator/health"
//!     - type: mask_sequences
//!       name: card_numbers
//!       pattern: '\d{4}-\d{4}-\d{4}-\d{4}'
//!       replace_placeholder: "[CARD]"
//! ```
//!
//! Events without a text message are left alone by every rule.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::processor::ProcessorKind;
use crate::config::ConfigError;
use crate::event_bus::DropReason;
use crate::logs::constants::MESSAGE_FIELD;
use crate::logs::event::PipelineEvent;
use crate::logs::processor::{Outcome, Processor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    ExcludeAtMatch,
    IncludeAtMatch,
    MaskSequences,
}

/// Compiled rule.
#[derive(Clone, Debug)]
pub struct Rule {
    pub kind: RuleKind,
    pub name: String,
    pub regex: regex::Regex,
    /// Only used by `mask_sequences`.
    pub placeholder: String,
}

impl Rule {
    /// Compiles a rule; an invalid pattern is a configuration error.
    pub fn compile(
        kind: RuleKind,
        name: &str,
        pattern: &str,
        placeholder: Option<&str>,
        position: usize,
    ) -> Result<Self, ConfigError> {
        let regex = regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidProcessor {
            position,
            kind: processor_kind(kind).to_string(),
            reason: format!("rule '{name}' has an invalid pattern: {e}"),
        })?;
        Ok(Rule {
            kind,
            name: name.to_string(),
            regex,
            placeholder: placeholder.unwrap_or_default().to_string(),
        })
    }

    /// Applies the rule to a message; `false` means the event must be dropped.
    pub fn apply(&self, message: &mut String) -> bool {
        match self.kind {
            RuleKind::ExcludeAtMatch => !self.regex.is_match(message),
            RuleKind::IncludeAtMatch => self.regex.is_match(message),
            RuleKind::MaskSequences => {
                if self.regex.is_match(message) {
                    *message = self
                        .regex
                        .replace_all(message, self.placeholder.as_str())
                        .into_owned();
                }
                true
            }
        }
    }
}

fn processor_kind(kind: RuleKind) -> ProcessorKind {
    match kind {
        RuleKind::ExcludeAtMatch => ProcessorKind::ExcludeAtMatch,
        RuleKind::IncludeAtMatch => ProcessorKind::IncludeAtMatch,
        RuleKind::MaskSequences => ProcessorKind::MaskSequences,
    }
}

#[derive(Debug, Clone)]
pub struct RuleProcessor {
    rule: Rule,
}

impl RuleProcessor {
    #[must_use]
    pub fn new(rule: Rule) -> Self {
        RuleProcessor { rule }
    }
}

#[async_trait]
impl Processor for RuleProcessor {
    fn kind(&self) -> ProcessorKind {
        processor_kind(self.rule.kind)
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        let Some(original) = event.message() else {
            return Outcome::Unchanged(event, None);
        };
        let mut message = original.to_string();

        if !self.rule.apply(&mut message) {
            return Outcome::Dropped {
                reason: DropReason::Filter,
                detail: format!("rule '{}'", self.rule.name),
            };
        }
        if message == original {
            return Outcome::Unchanged(event, None);
        }

        let mut document = event.document.clone();
        document.insert(MESSAGE_FIELD.to_string(), Value::from(message));
        Outcome::Enriched(event.with_document(document))
    }
}
