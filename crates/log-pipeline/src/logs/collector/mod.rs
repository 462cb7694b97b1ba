// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! The collector: capture discovery, per-owner workers and the forwarder.
//!
//! ```text
//!   capture_dir/<id>/<id>-json.log ──> Worker(id) ──┐
//!   capture_dir/<id>/<id>-json.log ──> Worker(id) ──┼──> mpsc ──> Forwarder ──> relay
//!   capture_dir/<id>/<id>-json.log ──> Worker(id) ──┘
//! ```
//!
//! Discovery rescans the capture directory periodically and starts exactly
//! one worker per owner. Shutdown cancels the workers, waits for them to
//! finish the lines they already read, then lets the forwarder drain.

pub mod tailer;
pub mod worker;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ensure_admission, Config};
use crate::error::PipelineError;
use crate::event_bus::Event;
use crate::logs::counters::{CountersSnapshot, PipelineCounters};
use crate::logs::forwarder::Forwarder;
use crate::logs::metadata::{ContainerConfigProvider, MetadataResolver, OwnerMetadataProvider};
use crate::logs::processor::registry::{BuildContext, ProcessorRegistry};
use crate::logs::processor::ProcessorChain;

use self::tailer::Tailer;
use self::worker::Worker;

pub struct Collector {
    config: Arc<Config>,
    chain: Arc<ProcessorChain>,
    resolver: Arc<MetadataResolver>,
    counters: Arc<PipelineCounters>,
    events: Option<Sender<Event>>,
}

impl Collector {
    /// Builds a collector whose owner metadata comes from the runtime's
    /// per-container config files.
    pub fn new(config: Arc<Config>, events: Option<Sender<Event>>) -> Result<Self, PipelineError> {
        let containers_dir = config
            .collector_containers_dir
            .clone()
            .unwrap_or_else(|| config.collector_capture_dir.clone());
        let provider = Arc::new(ContainerConfigProvider::new(containers_dir));
        Self::with_provider(config, provider, events)
    }

    pub fn with_provider(
        config: Arc<Config>,
        provider: Arc<dyn OwnerMetadataProvider>,
        events: Option<Sender<Event>>,
    ) -> Result<Self, PipelineError> {
        let resolver = Arc::new(MetadataResolver::new(
            provider,
            config.collector_metadata_wait,
            config.collector_metadata_retry_interval,
        ));
        let context = BuildContext {
            metadata: Some(Arc::clone(&resolver)),
        };
        let descriptors = config.collector_chain();
        ensure_admission(&descriptors)?;
        let chain = ProcessorRegistry::default().build_chain(&descriptors, &context)?;
        debug!("COLLECTOR | Processor chain: {:?}", chain.kinds());

        Ok(Collector {
            config,
            chain: Arc::new(chain),
            resolver,
            counters: Arc::new(PipelineCounters::default()),
            events,
        })
    }

    #[must_use]
    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Starts discovery, workers and the forwarder. Fails when the capture
    /// directory cannot be read, or when buffering is disabled and the relay
    /// cannot be reached.
    pub async fn start(self, cancel_token: CancellationToken) -> Result<RunningCollector, PipelineError> {
        let capture_dir = self.config.collector_capture_dir.clone();
        tokio::fs::read_dir(&capture_dir)
            .await
            .map_err(|source| PipelineError::CaptureDir {
                path: capture_dir.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel(self.config.collector_worker_queue_size);
        // The forwarder stops on its own once every worker is gone; its
        // token only bounds how long it keeps retrying after that.
        let forwarder_token = CancellationToken::new();
        let mut forwarder = Forwarder::new(
            &self.config,
            rx,
            Arc::clone(&self.counters),
            self.events.clone(),
            forwarder_token.clone(),
        );
        if self.config.collector_spool_capacity == 0 {
            forwarder
                .connect()
                .await
                .map_err(|e| PipelineError::DownstreamUnreachable {
                    component: "relay",
                    reason: format!("{}: {e}", forwarder.relay_addr()),
                })?;
        }
        let forwarder = tokio::spawn(forwarder.run());

        let discovery = Discovery {
            config: Arc::clone(&self.config),
            chain: self.chain,
            resolver: self.resolver,
            counters: Arc::clone(&self.counters),
            events: self.events,
            tx,
            known: HashMap::new(),
            workers: JoinSet::new(),
            cancel_token: cancel_token.clone(),
        };
        let discovery = tokio::spawn(discovery.run());
        info!(
            "COLLECTOR | Watching {} and forwarding to {}",
            capture_dir.display(),
            self.config.collector_relay_addr
        );

        Ok(RunningCollector {
            cancel_token,
            forwarder_token,
            discovery,
            forwarder,
            counters: self.counters,
        })
    }
}

pub struct RunningCollector {
    cancel_token: CancellationToken,
    forwarder_token: CancellationToken,
    discovery: JoinHandle<()>,
    forwarder: JoinHandle<()>,
    counters: Arc<PipelineCounters>,
}

impl RunningCollector {
    #[must_use]
    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Stops reading, finishes lines already read, drains the spool within
    /// the configured number of attempts and returns the final counters.
    pub async fn shutdown(self) -> CountersSnapshot {
        self.cancel_token.cancel();
        if let Err(e) = self.discovery.await {
            error!("COLLECTOR | Discovery task failed: {}", e);
        }
        // Workers are done; whatever the forwarder still holds gets a
        // bounded number of delivery attempts.
        self.forwarder_token.cancel();
        if let Err(e) = self.forwarder.await {
            error!("COLLECTOR | Forwarder task failed: {}", e);
        }
        let snapshot = self.counters.snapshot();
        info!("COLLECTOR | Stopped: {:?}", snapshot);
        snapshot
    }
}

struct Discovery {
    config: Arc<Config>,
    chain: Arc<ProcessorChain>,
    resolver: Arc<MetadataResolver>,
    counters: Arc<PipelineCounters>,
    events: Option<Sender<Event>>,
    tx: mpsc::Sender<String>,
    /// Running workers by owner, with the token that retires them.
    known: HashMap<String, CancellationToken>,
    workers: JoinSet<()>,
    cancel_token: CancellationToken,
}

impl Discovery {
    async fn run(mut self) {
        let mut initial_scan = true;
        loop {
            match scan_capture_dir(
                &self.config.collector_capture_dir,
                &self.config.collector_capture_file_suffix,
            )
            .await
            {
                Ok(found) => {
                    let present: HashSet<&str> =
                        found.iter().map(|(owner_id, _)| owner_id.as_str()).collect();
                    self.retire_missing(&present).await;
                    for (owner_id, path) in found {
                        // Files present at startup honor tail_from_end;
                        // files that appear later are read from the start.
                        let from_end = initial_scan && self.config.collector_tail_from_end;
                        self.start_worker(owner_id, path, from_end);
                    }
                }
                Err(e) => warn!(
                    "COLLECTOR | Failed to scan {}: {}",
                    self.config.collector_capture_dir.display(),
                    e
                ),
            }
            initial_scan = false;
            while let Some(result) = self.workers.try_join_next() {
                if let Err(e) = result {
                    error!("COLLECTOR | Worker task failed: {}", e);
                }
            }

            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = tokio::time::sleep(self.config.collector_rescan_interval) => {}
            }
        }

        drop(self.tx);
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("COLLECTOR | Worker task failed: {}", e);
            }
        }
        debug!("COLLECTOR | All workers stopped");
    }

    /// Owners whose capture file is gone: their worker finishes the file
    /// and stops, and their metadata is forgotten.
    async fn retire_missing(&mut self, present: &HashSet<&str>) {
        let missing: Vec<String> = self
            .known
            .keys()
            .filter(|owner_id| !present.contains(owner_id.as_str()))
            .cloned()
            .collect();
        for owner_id in missing {
            if let Some(retire) = self.known.remove(&owner_id) {
                info!("COLLECTOR | Capture file of owner {} removed, retiring its worker", owner_id);
                retire.cancel();
            }
            self.resolver.invalidate(&owner_id).await;
        }
    }

    fn start_worker(&mut self, owner_id: String, path: PathBuf, from_end: bool) {
        if self.known.contains_key(&owner_id) {
            return;
        }
        let retire = CancellationToken::new();
        self.known.insert(owner_id.clone(), retire.clone());
        info!(
            "COLLECTOR | Starting worker for owner {} ({})",
            owner_id,
            path.display()
        );
        let worker = Worker::new(
            owner_id,
            Tailer::new(path, from_end, self.config.collector_max_line_bytes),
            Arc::clone(&self.chain),
            self.tx.clone(),
            Arc::clone(&self.counters),
            self.events.clone(),
            self.config.collector_poll_interval,
            self.cancel_token.clone(),
        )
        .with_retirement(retire);
        self.workers.spawn(worker.spin());
    }
}

/// Finds capture files laid out as `<dir>/<owner_id>/<owner_id><suffix>`.
pub async fn scan_capture_dir(
    dir: &Path,
    suffix: &str,
) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let Some(owner_id) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let path = entry.path().join(format!("{owner_id}{suffix}"));
        if tokio::fs::try_exists(&path).await? {
            found.push((owner_id, path));
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::logs::capture::{CaptureWriter, OwnerMetadata, SourceStream};
    use crate::logs::metadata::MetadataRegistry;

    #[tokio::test]
    async fn test_scan_capture_dir() {
        let dir = tempfile::tempdir().unwrap();
        CaptureWriter::create(dir.path(), OwnerMetadata::new("b")).unwrap();
        CaptureWriter::create(dir.path(), OwnerMetadata::new("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("stray.log"), "x").unwrap();

        let found = scan_capture_dir(dir.path(), "-json.log").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(found[0].1.ends_with("a/a-json.log"));
    }

    #[tokio::test]
    async fn test_start_fails_on_missing_capture_dir() {
        let config = Config {
            collector_capture_dir: PathBuf::from("/definitely/not/here"),
            ..Config::default()
        };
        let collector = Collector::with_provider(
            Arc::new(config),
            Arc::new(MetadataRegistry::new()),
            None,
        )
        .unwrap();
        let result = collector.start(CancellationToken::new()).await;
        assert!(matches!(result, Err(PipelineError::CaptureDir { .. })));
    }

    #[tokio::test]
    async fn test_start_fails_without_relay_when_unbuffered() {
        let dir = tempfile::tempdir().unwrap();
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let config = Config {
            collector_capture_dir: dir.path().to_path_buf(),
            collector_relay_addr: addr,
            collector_spool_capacity: 0,
            collector_ack_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let collector = Collector::with_provider(
            Arc::new(config),
            Arc::new(MetadataRegistry::new()),
            None,
        )
        .unwrap();
        let result = collector.start(CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(PipelineError::DownstreamUnreachable {
                component: "relay",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_one_worker_per_owner_across_rescans() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CaptureWriter::create(
            dir.path(),
            OwnerMetadata::new("o1").with_label("collect_logs_with_filebeat", "true"),
        )
        .unwrap();
        writer.write_line(SourceStream::Stdout, "only once").unwrap();

        let config = Config {
            collector_capture_dir: dir.path().to_path_buf(),
            collector_rescan_interval: Duration::from_millis(10),
            collector_poll_interval: Duration::from_millis(10),
            collector_metadata_wait: Duration::from_millis(10),
            collector_metadata_retry_interval: Duration::from_millis(5),
            // Nobody listens here; the record stays in the spool.
            collector_relay_addr: "127.0.0.1:9".to_string(),
            collector_ack_timeout: Duration::from_millis(50),
            collector_backoff_base: Duration::from_millis(10),
            collector_backoff_max: Duration::from_millis(10),
            ..Config::default()
        };
        let collector = Collector::with_provider(
            Arc::new(config),
            Arc::new(MetadataRegistry::new()),
            None,
        )
        .unwrap();
        let running = collector.start(CancellationToken::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = running.shutdown().await;

        // Several rescans happened, the line was still processed once.
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.lost, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_removed_capture_file_retires_worker_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(MetadataRegistry::new());
        registry
            .register(OwnerMetadata::new("o1").with_label("collect_logs_with_filebeat", "true"))
            .await;
        let mut writer = CaptureWriter::create(dir.path(), OwnerMetadata::new("o1"))
            .unwrap()
            .without_embedded_metadata();
        writer.write_line(SourceStream::Stdout, "admitted").unwrap();

        let config = Config {
            collector_capture_dir: dir.path().to_path_buf(),
            collector_rescan_interval: Duration::from_millis(10),
            collector_poll_interval: Duration::from_millis(10),
            collector_metadata_wait: Duration::from_millis(10),
            collector_metadata_retry_interval: Duration::from_millis(5),
            collector_relay_addr: "127.0.0.1:9".to_string(),
            collector_ack_timeout: Duration::from_millis(50),
            collector_backoff_base: Duration::from_millis(10),
            collector_backoff_max: Duration::from_millis(10),
            ..Config::default()
        };
        let collector =
            Collector::with_provider(Arc::new(config), registry.clone(), None).unwrap();
        let running = collector.start(CancellationToken::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(writer);
        std::fs::remove_dir_all(dir.path().join("o1")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(logs_contain("Capture file of owner o1 removed, retiring its worker"));
        assert!(logs_contain("Worker for owner o1 retired at end of file"));

        // Same owner id again, without its labels: the cached metadata must
        // not admit it.
        registry.remove("o1").await;
        let mut writer = CaptureWriter::create(dir.path(), OwnerMetadata::new("o1"))
            .unwrap()
            .without_embedded_metadata();
        writer.write_line(SourceStream::Stdout, "not admitted").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let snapshot = running.shutdown().await;
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.admission_dropped, 1);
    }

    #[tokio::test]
    async fn test_chain_without_admission_is_refused() {
        let config = Config {
            collector_processors: Some(vec![
                crate::config::processor::ProcessorConfig::ValidateCorrelation {},
            ]),
            ..Config::default()
        };
        let result = Collector::with_provider(
            Arc::new(config),
            Arc::new(MetadataRegistry::new()),
            None,
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
