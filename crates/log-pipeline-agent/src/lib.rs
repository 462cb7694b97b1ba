// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Process plumbing shared by the `log-collector` and `log-relay` binaries:
//! configuration lookup, the tracing subscriber, signal handling and the
//! event bus consumer.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use log_pipeline::config::log_level::LogLevel;
use log_pipeline::config::{get_config, Config};
use log_pipeline::event_bus::{Event, EventBus};
use log_pipeline::logger::{env_filter, Formatter};
use log_pipeline::logs::counters::CountersSnapshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Directory holding `log-pipeline.yaml`; the working directory by default.
pub const CONFIG_DIR_ENV: &str = "LP_CONFIG_DIR";

#[must_use]
pub fn config_directory() -> PathBuf {
    env::var_os(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn init_tracing(level: LogLevel) {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level))
        .event_format(Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("LOG_PIPELINE | ERROR | Failed to install the tracing subscriber: {e}");
    }
}

/// Loads the configuration and installs logging at the configured level.
/// An invalid configuration is logged and yields `None`; the binaries then
/// exit without starting anything.
#[must_use]
pub fn startup(component: &str) -> Option<Arc<Config>> {
    let directory = config_directory();
    match get_config(&directory) {
        Ok(config) => {
            init_tracing(config.log_level);
            log_pipeline::log_build_info(component);
            Some(Arc::new(config))
        }
        Err(e) => {
            init_tracing(LogLevel::default());
            error!(
                "Invalid configuration (directory {}): {}",
                directory.display(),
                e
            );
            None
        }
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where there is one.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Logs every event until the bus is closed or a tombstone arrives.
pub fn spawn_event_logger(mut bus: EventBus) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = bus.rx.recv().await {
            match event {
                Event::Tombstone => break,
                Event::RecordsLost { count } => {
                    error!("EVENT_BUS | {} record(s) lost", count);
                }
                event => debug!("EVENT_BUS | {:?}", event),
            }
        }
    })
}

/// One line per component at shutdown.
pub fn log_summary(component: &str, snapshot: &CountersSnapshot) {
    tracing::info!(
        "{} | processed={} forwarded={} indexed={} admission_dropped={} filter_dropped={} \
         malformed={} rejected={} lost={} decode_errors={} metadata_incomplete={} correlation_partial={}",
        component,
        snapshot.processed,
        snapshot.forwarded,
        snapshot.indexed,
        snapshot.admission_dropped,
        snapshot.filter_dropped,
        snapshot.malformed,
        snapshot.rejected,
        snapshot.lost,
        snapshot.decode_errors,
        snapshot.metadata_incomplete,
        snapshot.correlation_partial,
    );
}
