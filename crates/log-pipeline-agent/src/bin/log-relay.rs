// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use log_pipeline::event_bus::{publish, Event, EventBus};
use log_pipeline::http::get_client;
use log_pipeline::logs::index::elasticsearch::ElasticsearchStore;
use log_pipeline::logs::relay::Relay;
use log_pipeline_agent::{log_summary, shutdown_signal, spawn_event_logger, startup};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
pub async fn main() -> ExitCode {
    let Some(config) = startup("log-relay") else {
        return ExitCode::FAILURE;
    };

    let (event_bus, events) = EventBus::run();
    let event_logger = spawn_event_logger(event_bus);

    let store = Arc::new(ElasticsearchStore::new(
        get_client(&config),
        config.index_url.clone(),
    ));
    let relay = match Relay::new(Arc::clone(&config), store, Some(events.clone())) {
        Ok(relay) => relay,
        Err(e) => {
            error!("RELAY | Invalid processor chain: {e}");
            return ExitCode::FAILURE;
        }
    };
    let running = match relay.start(CancellationToken::new()).await {
        Ok(running) => running,
        Err(e) => {
            error!("RELAY | Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "RELAY | Indexing into {} with prefix {}",
        config.index_url, config.index_prefix
    );

    shutdown_signal().await;
    info!("RELAY | Shutting down, flushing pending documents");
    let snapshot = running.shutdown().await;
    log_summary("RELAY", &snapshot);

    publish(Some(&events), Event::Tombstone);
    drop(events);
    let _ = event_logger.await;
    ExitCode::SUCCESS
}
