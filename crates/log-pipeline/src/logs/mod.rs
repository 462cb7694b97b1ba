// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

pub mod backoff;
pub mod capture;
pub mod collector;
pub mod constants;
pub mod counters;
pub mod emitter;
pub mod event;
pub mod forwarder;
pub mod index;
pub mod metadata;
pub mod processor;
pub mod query;
pub mod record;
pub mod relay;
pub mod spool;
pub mod transport;
