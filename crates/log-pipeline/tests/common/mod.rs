// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use log_pipeline::config::Config;
use tokio::time::{sleep, Instant};

/// Polls `check` until it holds or `deadline` passes.
pub async fn wait_until<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let until = Instant::now() + deadline;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= until {
            return false;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Short intervals everywhere so a full pipeline settles in milliseconds.
pub fn fast_config(capture_dir: &Path) -> Config {
    Config {
        collector_capture_dir: capture_dir.to_path_buf(),
        collector_tail_from_end: false,
        collector_poll_interval: Duration::from_millis(10),
        collector_rescan_interval: Duration::from_millis(20),
        collector_metadata_wait: Duration::from_millis(500),
        collector_metadata_retry_interval: Duration::from_millis(10),
        collector_flush_interval: Duration::from_millis(10),
        collector_ack_timeout: Duration::from_millis(500),
        collector_backoff_base: Duration::from_millis(10),
        collector_backoff_max: Duration::from_millis(50),
        relay_listen_addr: "127.0.0.1:0".to_string(),
        index_flush_interval: Duration::from_millis(10),
        index_backoff_base: Duration::from_millis(10),
        index_backoff_max: Duration::from_millis(50),
        ..Config::default()
    }
}
