// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Field manipulation: drop, rename and add.
//!
//! Field names may use dots to address nested objects (`owner.image`).

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::processor::{FieldRename, ProcessorKind};
use crate::logs::event::PipelineEvent;
use crate::logs::processor::{Outcome, Processor};

fn remove_path(document: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Value::Object(nested)) => remove_path(nested, rest),
            _ => None,
        },
    }
}

fn contains_path(document: &Map<String, Value>, path: &str) -> bool {
    match path.split_once('.') {
        None => document.contains_key(path),
        Some((head, rest)) => match document.get(head) {
            Some(Value::Object(nested)) => contains_path(nested, rest),
            _ => false,
        },
    }
}

/// Inserts at `path`, creating intermediate objects. Fails when an
/// intermediate key holds something other than an object.
fn insert_path(document: &mut Map<String, Value>, path: &str, value: Value) -> bool {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
            true
        }
        Some((head, rest)) => {
            let nested = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match nested {
                Value::Object(nested) => insert_path(nested, rest, value),
                _ => false,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DropFields {
    fields: Vec<String>,
}

impl DropFields {
    #[must_use]
    pub fn new(fields: Vec<String>) -> Self {
        DropFields { fields }
    }
}

#[async_trait]
impl Processor for DropFields {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DropFields
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        let mut document = event.document.clone();
        let removed = self
            .fields
            .iter()
            .filter(|field| remove_path(&mut document, field).is_some())
            .count();
        if removed == 0 {
            Outcome::Unchanged(event, None)
        } else {
            Outcome::Enriched(event.with_document(document))
        }
    }
}

/// Moves values to new names. A rename whose target already exists is
/// skipped so no value is silently lost.
#[derive(Debug, Clone)]
pub struct RenameFields {
    fields: Vec<FieldRename>,
}

impl RenameFields {
    #[must_use]
    pub fn new(fields: Vec<FieldRename>) -> Self {
        RenameFields { fields }
    }
}

#[async_trait]
impl Processor for RenameFields {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::RenameFields
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        let mut document = event.document.clone();
        let mut skipped = Vec::new();
        let mut renamed = 0;
        for rename in &self.fields {
            if !contains_path(&document, &rename.from) {
                continue;
            }
            if contains_path(&document, &rename.to) {
                skipped.push(rename.to.as_str());
                continue;
            }
            if let Some(value) = remove_path(&mut document, &rename.from) {
                if insert_path(&mut document, &rename.to, value.clone()) {
                    renamed += 1;
                } else {
                    // Put it back where it was.
                    insert_path(&mut document, &rename.from, value);
                    skipped.push(rename.to.as_str());
                }
            }
        }

        let warning = (!skipped.is_empty())
            .then(|| format!("target fields already present: {}", skipped.join(", ")));
        if renamed == 0 {
            Outcome::Unchanged(event, warning)
        } else {
            if let Some(warning) = warning {
                tracing::debug!("PROCESSOR | rename_fields: {}", warning);
            }
            Outcome::Enriched(event.with_document(document))
        }
    }
}

/// Adds constant fields, at the root or under `target`.
#[derive(Debug, Clone)]
pub struct AddFields {
    target: Option<String>,
    fields: Map<String, Value>,
}

impl AddFields {
    #[must_use]
    pub fn new(target: Option<String>, fields: Map<String, Value>) -> Self {
        AddFields { target, fields }
    }
}

#[async_trait]
impl Processor for AddFields {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::AddFields
    }

    async fn process(&self, event: PipelineEvent) -> Outcome {
        let mut document = event.document.clone();
        for (key, value) in &self.fields {
            let path = match &self.target {
                Some(target) => format!("{target}.{key}"),
                None => key.clone(),
            };
            if !insert_path(&mut document, &path, value.clone()) {
                let warning = format!("cannot add '{path}': a parent field is not an object");
                return Outcome::Unchanged(event, Some(warning));
            }
        }
        Outcome::Enriched(event.with_document(document))
    }
}
