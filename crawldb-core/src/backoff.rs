//! Exponential backoff for connection attempts.
//!
//! The default [`BackoffPolicy`] never gives up: the wait interval grows
//! geometrically up to a ceiling and attempts continue until the backend comes
//! up. Setting [`BackoffPolicy::max_elapsed_time`] turns it into a bounded
//! policy.

use std::time::Duration;

/// Parameters of an exponential backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Wait before the second attempt.
    pub initial_interval: Duration,
    /// Factor applied to the interval after every failed attempt.
    pub multiplier: f64,
    /// Ceiling for a single wait.
    pub max_interval: Duration,
    /// Total time after which no further attempt is scheduled. `None` retries forever.
    pub max_elapsed_time: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: None,
        }
    }
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_max_elapsed_time(mut self, elapsed: Option<Duration>) -> Self {
        self.max_elapsed_time = elapsed;
        self
    }

    /// Starts a fresh schedule.
    pub fn start(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            policy: self.clone(),
            current: self.initial_interval.min(self.max_interval),
            elapsed: Duration::ZERO,
        }
    }
}

/// A running backoff schedule.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    current: Duration,
    elapsed: Duration,
}

impl ExponentialBackoff {
    /// Returns the wait before the next attempt and advances the schedule, or
    /// `None` once the elapsed budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let wait = self.current;

        if let Some(max_elapsed) = self.policy.max_elapsed_time {
            if self.elapsed.saturating_add(wait) > max_elapsed {
                return None;
            }
        }

        self.elapsed = self.elapsed.saturating_add(wait);
        self.current = self
            .current
            .mul_f64(self.policy.multiplier.max(1.0))
            .min(self.policy.max_interval);

        Some(wait)
    }

    /// Total wait scheduled so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Restarts the schedule from the initial interval.
    pub fn reset(&mut self) {
        self.current = self.policy.initial_interval.min(self.policy.max_interval);
        self.elapsed = Duration::ZERO;
    }
}
