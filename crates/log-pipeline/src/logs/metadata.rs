// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Owner metadata resolution.
//!
//! Capture lines only reliably carry the owner id; name, image and labels come
//! from the container runtime and may become available slightly after the
//! first lines are written. [`MetadataResolver`] waits a bounded time for
//! them and then degrades to "unresolved".

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::logs::capture::OwnerMetadata;
use crate::logs::constants::CONTAINER_CONFIG_FILE;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read container config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse container config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Source of owner metadata. `Ok(None)` means "not known (yet)".
#[async_trait]
pub trait OwnerMetadataProvider: Send + Sync {
    async fn lookup(&self, owner_id: &str) -> Result<Option<OwnerMetadata>, MetadataError>;
}

/// In-memory metadata, updated by whoever learns about owners.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    owners: Arc<RwLock<HashMap<String, OwnerMetadata>>>,
}

impl MetadataRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, owner: OwnerMetadata) {
        self.owners.write().await.insert(owner.id.clone(), owner);
    }

    pub async fn remove(&self, owner_id: &str) {
        self.owners.write().await.remove(owner_id);
    }
}

#[async_trait]
impl OwnerMetadataProvider for MetadataRegistry {
    async fn lookup(&self, owner_id: &str) -> Result<Option<OwnerMetadata>, MetadataError> {
        Ok(self.owners.read().await.get(owner_id).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct ContainerConfigFile {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Config", default)]
    config: ContainerConfigSection,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerConfigSection {
    #[serde(rename = "Image", default)]
    image: Option<String>,
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
}

/// Reads the runtime's `<containers_dir>/<id>/config.v2.json`.
#[derive(Debug, Clone)]
pub struct ContainerConfigProvider {
    containers_dir: PathBuf,
}

impl ContainerConfigProvider {
    #[must_use]
    pub fn new(containers_dir: PathBuf) -> Self {
        ContainerConfigProvider { containers_dir }
    }
}

#[async_trait]
impl OwnerMetadataProvider for ContainerConfigProvider {
    async fn lookup(&self, owner_id: &str) -> Result<Option<OwnerMetadata>, MetadataError> {
        let path = self
            .containers_dir
            .join(owner_id)
            .join(CONTAINER_CONFIG_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MetadataError::Io { path, source }),
        };
        let file: ContainerConfigFile = serde_json::from_slice(&bytes)
            .map_err(|source| MetadataError::Parse { path, source })?;

        Ok(Some(OwnerMetadata {
            id: owner_id.to_string(),
            name: file.name.map(|n| n.trim_start_matches('/').to_string()),
            image: file.config.image,
            labels: file.config.labels.unwrap_or_default(),
        }))
    }
}

/// Caching, time-bounded front for a provider.
pub struct MetadataResolver {
    provider: Arc<dyn OwnerMetadataProvider>,
    wait: Duration,
    retry_interval: Duration,
    cache: Mutex<HashMap<String, OwnerMetadata>>,
    unresolved: Mutex<HashSet<String>>,
}

impl MetadataResolver {
    #[must_use]
    pub fn new(
        provider: Arc<dyn OwnerMetadataProvider>,
        wait: Duration,
        retry_interval: Duration,
    ) -> Self {
        MetadataResolver {
            provider,
            wait,
            retry_interval,
            cache: Mutex::new(HashMap::new()),
            unresolved: Mutex::new(HashSet::new()),
        }
    }

    /// Resolves an owner, waiting at most the configured window the first
    /// time. Owners that already timed out are retried once per call without
    /// waiting, so a worker is never stalled on every line.
    pub async fn resolve(&self, owner_id: &str) -> Option<OwnerMetadata> {
        if let Some(owner) = self.cache.lock().await.get(owner_id) {
            return Some(owner.clone());
        }

        let previously_unresolved = self.unresolved.lock().await.contains(owner_id);
        let deadline = Instant::now() + self.wait;
        loop {
            match self.provider.lookup(owner_id).await {
                Ok(Some(owner)) => {
                    self.unresolved.lock().await.remove(owner_id);
                    self.cache
                        .lock()
                        .await
                        .insert(owner_id.to_string(), owner.clone());
                    return Some(owner);
                }
                Ok(None) => debug!("COLLECTOR | Metadata for owner {} not available yet", owner_id),
                Err(e) => warn!("COLLECTOR | Metadata lookup for owner {} failed: {}", owner_id, e),
            }

            if previously_unresolved || Instant::now() + self.retry_interval > deadline {
                break;
            }
            tokio::time::sleep(self.retry_interval).await;
        }

        if !previously_unresolved {
            warn!(
                "COLLECTOR | Metadata for owner {} unresolved after {:?}",
                owner_id, self.wait
            );
            self.unresolved.lock().await.insert(owner_id.to_string());
        }
        None
    }

    /// Forgets cached metadata, e.g. when an owner's capture file disappears.
    pub async fn invalidate(&self, owner_id: &str) {
        self.cache.lock().await.remove(owner_id);
        self.unresolved.lock().await.remove(owner_id);
    }
}
