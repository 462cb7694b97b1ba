// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Resolves processor descriptors into concrete processors.
//!
//! Each [`ProcessorKind`] maps to a builder function. The built-in kinds are
//! registered by [`ProcessorRegistry::default`]; embedders can register their
//! own builder for a kind to replace the built-in one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::processor::{ProcessorConfig, ProcessorKind};
use crate::config::ConfigError;
use crate::logs::metadata::MetadataResolver;
use crate::logs::processor::{
    correlation::ValidateCorrelation,
    decode_json::{DecodeJsonFields, Trigger},
    docker_metadata::AddDockerMetadata,
    fields::{AddFields, DropFields, RenameFields},
    label_filter::LabelFilter,
    rules::{Rule, RuleKind, RuleProcessor},
    Processor, ProcessorChain,
};

/// What builders may need besides the descriptor itself.
#[derive(Clone, Default)]
pub struct BuildContext {
    /// Required by `add_docker_metadata`; the relay has none.
    pub metadata: Option<Arc<MetadataResolver>>,
}

pub type Builder =
    fn(&ProcessorConfig, &BuildContext, usize) -> Result<Box<dyn Processor>, ConfigError>;

pub struct ProcessorRegistry {
    builders: HashMap<ProcessorKind, Builder>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        let mut registry = ProcessorRegistry {
            builders: HashMap::new(),
        };
        registry.register(ProcessorKind::AddDockerMetadata, build_add_docker_metadata);
        registry.register(ProcessorKind::LabelFilter, build_label_filter);
        registry.register(ProcessorKind::DecodeJsonFields, build_decode_json_fields);
        registry.register(ProcessorKind::ValidateCorrelation, build_validate_correlation);
        registry.register(ProcessorKind::DropFields, build_drop_fields);
        registry.register(ProcessorKind::RenameFields, build_rename_fields);
        registry.register(ProcessorKind::AddFields, build_add_fields);
        registry.register(ProcessorKind::ExcludeAtMatch, build_rule);
        registry.register(ProcessorKind::IncludeAtMatch, build_rule);
        registry.register(ProcessorKind::MaskSequences, build_rule);
        registry
    }
}

impl ProcessorRegistry {
    pub fn register(&mut self, kind: ProcessorKind, builder: Builder) {
        self.builders.insert(kind, builder);
    }

    /// Builds a chain in descriptor order. The first descriptor that cannot be
    /// built fails the whole chain.
    pub fn build_chain(
        &self,
        descriptors: &[ProcessorConfig],
        context: &BuildContext,
    ) -> Result<ProcessorChain, ConfigError> {
        let mut processors = Vec::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            let kind = descriptor.kind();
            let builder = self
                .builders
                .get(&kind)
                .ok_or_else(|| ConfigError::InvalidProcessor {
                    position,
                    kind: kind.to_string(),
                    reason: "no builder registered for this kind".to_string(),
                })?;
            processors.push(builder(descriptor, context, position)?);
        }
        let chain = ProcessorChain::new(processors);
        debug!("PROCESSOR | Built chain {:?}", chain.kinds());
        Ok(chain)
    }
}

fn mismatch(descriptor: &ProcessorConfig, position: usize) -> ConfigError {
    ConfigError::InvalidProcessor {
        position,
        kind: descriptor.kind().to_string(),
        reason: "builder registered for a different kind".to_string(),
    }
}

fn build_add_docker_metadata(
    descriptor: &ProcessorConfig,
    context: &BuildContext,
    position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    match &context.metadata {
        Some(resolver) => Ok(Box::new(AddDockerMetadata::new(Arc::clone(resolver)))),
        None => Err(ConfigError::InvalidProcessor {
            position,
            kind: descriptor.kind().to_string(),
            reason: "no owner metadata provider is available here".to_string(),
        }),
    }
}

fn build_label_filter(
    descriptor: &ProcessorConfig,
    _context: &BuildContext,
    position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    match descriptor {
        ProcessorConfig::LabelFilter { label, value } => {
            if label.trim().is_empty() {
                return Err(ConfigError::InvalidProcessor {
                    position,
                    kind: descriptor.kind().to_string(),
                    reason: "label must not be empty".to_string(),
                });
            }
            Ok(Box::new(LabelFilter::new(label.clone(), value.clone())))
        }
        _ => Err(mismatch(descriptor, position)),
    }
}

fn build_decode_json_fields(
    descriptor: &ProcessorConfig,
    _context: &BuildContext,
    position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    match descriptor {
        ProcessorConfig::DecodeJsonFields {
            trigger_label,
            trigger_value,
            source_field,
            target,
            overwrite_policy,
        } => {
            let trigger = trigger_label.as_ref().map(|label| Trigger {
                label: label.clone(),
                value: trigger_value.clone(),
            });
            let target = target.clone().filter(|t| !t.trim().is_empty());
            Ok(Box::new(DecodeJsonFields::new(
                trigger,
                source_field.clone(),
                target,
                *overwrite_policy,
            )))
        }
        _ => Err(mismatch(descriptor, position)),
    }
}

fn build_validate_correlation(
    _descriptor: &ProcessorConfig,
    _context: &BuildContext,
    _position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    Ok(Box::new(ValidateCorrelation))
}

fn build_drop_fields(
    descriptor: &ProcessorConfig,
    _context: &BuildContext,
    position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    match descriptor {
        ProcessorConfig::DropFields { fields } => Ok(Box::new(DropFields::new(fields.clone()))),
        _ => Err(mismatch(descriptor, position)),
    }
}

fn build_rename_fields(
    descriptor: &ProcessorConfig,
    _context: &BuildContext,
    position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    match descriptor {
        ProcessorConfig::RenameFields { fields } => {
            Ok(Box::new(RenameFields::new(fields.clone())))
        }
        _ => Err(mismatch(descriptor, position)),
    }
}

fn build_add_fields(
    descriptor: &ProcessorConfig,
    _context: &BuildContext,
    position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    match descriptor {
        ProcessorConfig::AddFields { target, fields } => {
            Ok(Box::new(AddFields::new(target.clone(), fields.clone())))
        }
        _ => Err(mismatch(descriptor, position)),
    }
}

fn build_rule(
    descriptor: &ProcessorConfig,
    _context: &BuildContext,
    position: usize,
) -> Result<Box<dyn Processor>, ConfigError> {
    let rule = match descriptor {
        ProcessorConfig::ExcludeAtMatch { name, pattern } => {
            Rule::compile(RuleKind::ExcludeAtMatch, name, pattern, None, position)?
        }
        ProcessorConfig::IncludeAtMatch { name, pattern } => {
            Rule::compile(RuleKind::IncludeAtMatch, name, pattern, None, position)?
        }
        ProcessorConfig::MaskSequences {
            name,
            pattern,
            replace_placeholder,
        } => Rule::compile(
            RuleKind::MaskSequences,
            name,
            pattern,
            replace_placeholder.as_deref(),
            position,
        )?,
        _ => return Err(mismatch(descriptor, position)),
    };
    Ok(Box::new(RuleProcessor::new(rule)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::processor::default_collector_processors;
    use crate::logs::metadata::MetadataRegistry;

    fn collector_context() -> BuildContext {
        BuildContext {
            metadata: Some(Arc::new(MetadataResolver::new(
                Arc::new(MetadataRegistry::new()),
                Duration::from_millis(10),
                Duration::from_millis(5),
            ))),
        }
    }

    #[test]
    fn test_default_chain_builds_in_order() {
        let chain = ProcessorRegistry::default()
            .build_chain(&default_collector_processors(), &collector_context())
            .unwrap();
        assert_eq!(
            chain.kinds(),
            vec![
                ProcessorKind::AddDockerMetadata,
                ProcessorKind::LabelFilter,
                ProcessorKind::DecodeJsonFields,
                ProcessorKind::ValidateCorrelation,
            ]
        );
    }

    #[test]
    fn test_docker_metadata_requires_provider() {
        let result = ProcessorRegistry::default().build_chain(
            &[ProcessorConfig::AddDockerMetadata {}],
            &BuildContext::default(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidProcessor { position: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_regex_fails_chain() {
        let result = ProcessorRegistry::default().build_chain(
            &[
                ProcessorConfig::ValidateCorrelation {},
                ProcessorConfig::ExcludeAtMatch {
                    name: "broken".to_string(),
                    pattern: "(".to_string(),
                },
            ],
            &BuildContext::default(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidProcessor { position: 1, .. })
        ));
    }

    #[test]
    fn test_custom_builder_replaces_builtin() {
        fn always_correlation(
            _descriptor: &ProcessorConfig,
            _context: &BuildContext,
            _position: usize,
        ) -> Result<Box<dyn Processor>, ConfigError> {
            Ok(Box::new(ValidateCorrelation))
        }

        let mut registry = ProcessorRegistry::default();
        registry.register(ProcessorKind::DropFields, always_correlation);
        let chain = registry
            .build_chain(
                &[ProcessorConfig::DropFields {
                    fields: vec!["x".to_string()],
                }],
                &BuildContext::default(),
            )
            .unwrap();
        assert_eq!(chain.kinds(), vec![ProcessorKind::ValidateCorrelation]);
    }

    #[test]
    fn test_empty_descriptor_list_is_pass_through() {
        let chain = ProcessorRegistry::default()
            .build_chain(&[], &BuildContext::default())
            .unwrap();
        assert!(chain.is_empty());
    }
}
