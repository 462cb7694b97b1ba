// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors that stop a component from starting.
//!
//! Everything that can go wrong while records flow (transport hiccups,
//! metadata lookups, undecodable messages) is handled in place and never
//! reaches this type.

use crate::config::ConfigError;
use crate::logs::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("{component} is unreachable and buffering is disabled: {reason}")]
    DownstreamUnreachable {
        component: &'static str,
        reason: String,
    },
    #[error("capture directory {path} is not readable: {source}")]
    CaptureDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}
