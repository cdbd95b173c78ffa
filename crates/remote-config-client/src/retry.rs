// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry ceiling and exponential backoff for unreachable services.

use std::time::Duration;

/// Configuration parameters for exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Exponential factor applied on error count increments.
    pub factor: f64,
    /// Number of consecutive successful calls required to decrease the error count.
    pub recovery_interval: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            factor: 2.0,
            recovery_interval: 2,
        }
    }
}

/// Tracks the state of the exponential backoff algorithm.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    error_count: usize,
    success_streak: usize,
}

impl BackoffState {
    /// Creates a new backoff state with the provided configuration.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            error_count: 0,
            success_streak: 0,
        }
    }

    /// Registers a failure and returns the recommended delay before retrying.
    pub fn register_error(&mut self) -> Duration {
        self.success_streak = 0;
        self.error_count = self.error_count.saturating_add(1);
        let exponent = self.error_count.saturating_sub(1);
        // keeps powi() well inside f64 range; the max_backoff cap applies long before
        let capped_exponent = exponent.min(64) as i32;
        let backoff_secs = self.config.base.as_secs_f64() * self.config.factor.powi(capped_exponent);
        let max_backoff = self.config.max_backoff;
        let capped = backoff_secs.min(max_backoff.as_secs_f64()).max(0.0);
        // caps near u64::MAX seconds round up past what a Duration can hold
        Duration::try_from_secs_f64(capped).map_or(max_backoff, |delay| delay.min(max_backoff))
    }

    /// Registers a success and decreases the error count once enough
    /// consecutive successes were observed.
    pub fn register_success(&mut self) {
        if self.config.recovery_interval == 0 {
            self.error_count = self.error_count.saturating_sub(2);
            self.success_streak = 0;
            return;
        }

        self.success_streak = self.success_streak.saturating_add(1);
        if self.success_streak >= self.config.recovery_interval {
            self.error_count = self.error_count.saturating_sub(2);
            self.success_streak = 0;
        }
    }
}

/// Supervisor-owned policy deciding when an unreachable client gives up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries allowed after the first failed attempt.
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    /// Whether a session with `retry_count` consecutive failures must be disabled.
    #[must_use]
    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count > self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates exponential growth, the cap, and decay after successes.
    #[test]
    fn backoff_state_progression_and_recovery() {
        let config = BackoffConfig {
            base: Duration::from_secs(30),
            max_backoff: Duration::from_secs(120),
            factor: 2.0,
            recovery_interval: 2,
        };
        let mut state = BackoffState::new(config);

        assert_eq!(state.register_error(), Duration::from_secs(30));
        assert_eq!(state.register_error(), Duration::from_secs(60));
        assert_eq!(state.register_error(), Duration::from_secs(120));

        // one success is not enough to decay with a recovery interval of 2
        state.register_success();
        assert_eq!(state.register_error(), Duration::from_secs(120));

        let mut recovering = BackoffState::new(config);
        recovering.register_error();
        recovering.register_error();
        recovering.register_error();
        recovering.register_success();
        recovering.register_success();
        assert_eq!(recovering.register_error(), Duration::from_secs(60));

        let mut fast_recovery = BackoffState::new(BackoffConfig {
            base: Duration::from_secs(10),
            max_backoff: Duration::from_secs(100),
            factor: 2.0,
            recovery_interval: 0,
        });
        assert_eq!(fast_recovery.register_error(), Duration::from_secs(10));
        assert_eq!(fast_recovery.register_error(), Duration::from_secs(20));
        fast_recovery.register_success();
        assert_eq!(fast_recovery.register_error(), Duration::from_secs(10));
    }

    #[test]
    fn backoff_never_exceeds_cap() {
        let mut state = BackoffState::new(BackoffConfig::default());
        for _ in 0..200 {
            assert!(state.register_error() <= BackoffConfig::default().max_backoff);
        }
    }

    /// A cap at the edge of what `Duration` can hold is returned as is.
    #[test]
    fn backoff_with_unbounded_cap_does_not_overflow() {
        let max_backoff = Duration::from_secs(u64::MAX);
        let mut state = BackoffState::new(BackoffConfig {
            max_backoff,
            ..BackoffConfig::default()
        });
        let mut last = Duration::ZERO;
        for _ in 0..100 {
            last = state.register_error();
            assert!(last <= max_backoff);
        }
        assert_eq!(last, max_backoff);
    }

    /// `max_retries` counts retries, so the ceiling is hit one failure later.
    #[test]
    fn retry_ceiling_counts_retries_after_first_failure() {
        for max_retries in [0, 1, 3, 10] {
            let policy = RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            };
            assert!(!policy.exhausted(max_retries));
            assert!(policy.exhausted(max_retries + 1));
        }
    }
}
