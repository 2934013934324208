//! Configuration for the sync executor.

use rand::Rng;
use std::time::Duration;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of in-flight admin API calls.
    pub concurrency: usize,
    /// Report every change as applied without calling the admin API.
    pub dry_run: bool,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            dry_run: false,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the concurrency limit (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Enables or disables dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Retry policy for transient admin API failures.
///
/// The wait after the n-th failed call is `initial_delay * 2^(n-1)`, capped
/// at `max_delay`, plus up to a quarter of itself when `jitter` is set.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Calls per change, the first one included.
    pub max_attempts: u32,
    /// Wait after the first failed call.
    pub initial_delay: Duration,
    /// Upper bound on a single wait, jitter excluded.
    pub max_delay: Duration,
    /// Randomize waits so parallel workers do not retry in lockstep.
    pub jitter: bool,
}

impl RetryConfig {
    /// Creates a policy allowing `max_attempts` calls (at least 1).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the wait after the first failed call.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before the next call after `failures` failed calls.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let doublings = failures.saturating_sub(1).min(31);
        let delay = self
            .initial_delay
            .saturating_mul(1 << doublings)
            .min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            delay.mul_f64(1.0 + 0.25 * rand::thread_rng().gen::<f64>())
        } else {
            delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
