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
use log_pipeline::logs::collector::Collector;
use log_pipeline_agent::{log_summary, shutdown_signal, spawn_event_logger, startup};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
pub async fn main() -> ExitCode {
    let Some(config) = startup("log-collector") else {
        return ExitCode::FAILURE;
    };

    let (event_bus, events) = EventBus::run();
    let event_logger = spawn_event_logger(event_bus);

    let collector = match Collector::new(Arc::clone(&config), Some(events.clone())) {
        Ok(collector) => collector,
        Err(e) => {
            error!("COLLECTOR | Invalid processor chain: {e}");
            return ExitCode::FAILURE;
        }
    };
    let running = match collector.start(CancellationToken::new()).await {
        Ok(running) => running,
        Err(e) => {
            error!("COLLECTOR | Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    shutdown_signal().await;
    info!("COLLECTOR | Shutting down, draining spool");
    let snapshot = running.shutdown().await;
    log_summary("COLLECTOR", &snapshot);

    publish(Some(&events), Event::Tombstone);
    drop(events);
    let _ = event_logger.await;
    ExitCode::SUCCESS
}
