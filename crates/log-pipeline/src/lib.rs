// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! # Log Pipeline
//!
//! This crate implements a trace-correlated log pipeline: services write one
//! structured JSON record per line to stdout, the container runtime captures
//! every line into a per-container append-only file, and this crate takes it
//! from there.
//!
//! ## Overview
//!
//! - **Collector**: discovers and tails capture files (one worker per owner),
//!   runs an ordered processor chain (metadata enrichment, admission control,
//!   conditional JSON decoding, ...) and pushes survivors to a relay.
//! - **Relay**: accepts batches from many collectors over a framed TCP
//!   protocol, runs its own processor chain and bulk-writes to the index.
//! - **Index**: an `IndexStore` abstraction with an Elasticsearch-compatible
//!   bulk client and an in-memory implementation.
//!
//! ## Architecture
//!
//! - [`config`]: Configuration from YAML files and `LP_*` environment variables
//! - [`logs`]: The pipeline itself (records, capture format, processors,
//!   collector, transport, relay, index)
//! - [`event_bus`]: Pipeline events (drops, flushes, losses) for observers
//! - [`logger`]: `tracing` formatter used by the binaries

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]

/// Pipeline settings from `pipeline.yaml`, `LP_*` variables and defaults
pub mod config;

/// Fatal pipeline errors surfaced at startup
pub mod error;

/// Drop, flush and loss notifications for observers
pub mod event_bus;

/// HTTP client construction for the index bulk API
pub mod http;

/// Log line formatting for the agent binaries
pub mod logger;

/// Log records, capture format, processors, collector, relay and index
pub mod logs;

/// Pipeline version reported at startup.
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp (set at compile time by `build.rs`, RFC3339).
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");

/// Announces the component version and build time.
///
/// Call once after the tracing subscriber is installed.
pub fn log_build_info(component: &str) {
    tracing::info!(
        "{} version: {}, built: {}",
        component,
        PIPELINE_VERSION,
        BUILD_TIMESTAMP
    );
}
