// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry delays with jitter

use orc_core::RetryPolicy;
use rand::RngExt;
use std::time::Duration;

/// Spread `base` uniformly by `±jitter` (a fraction, clamped to `0..=1`;
/// NaN means none)
pub fn jittered(base: Duration, jitter: f64) -> Duration {
    let jitter = if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) };
    if jitter == 0.0 || base.is_zero() {
        return base;
    }
    let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
    base.mul_f64(factor)
}

/// Delay before retry number `retry` (1-based) of a task
pub fn task_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    jittered(policy.base_delay(retry), policy.jitter)
}

/// Exponential reconnect schedule, reset after a healthy connection
#[derive(Debug, Clone)]
pub struct Reconnect {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Reconnect {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, next: initial }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        jittered(delay, 0.1)
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
