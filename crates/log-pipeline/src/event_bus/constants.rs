// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

/// Capacity of the event bus channel. Producers use `try_send`, so a slow
/// observer loses events instead of stalling the pipeline.
pub(crate) const MAX_EVENTS: usize = 100;
