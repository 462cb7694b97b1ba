// Copyright 2026-Present The log-pipeline Authors
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff for delivery retries: `base`, `2*base`, `4*base`, ...
//! capped at `max`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Backoff {
            base,
            max: max.max(base),
            attempts: 0,
        }
    }

    /// Delay before the next attempt; each call doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        // 2^16 * base is far beyond any sensible cap
        let factor = 2_u32.pow(self.attempts.min(16));
        self.attempts = self.attempts.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
