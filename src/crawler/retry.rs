//! Retry policy for transient fetch failures
//!
//! Backoff before attempt `k + 1` (after `k` failed attempts):
//!
//! ```text
//! delay(k) = min(base * 2^(k-1) * (1 + u * jitter), cap)    u in [0, 1)
//! ```
//!
//! With `jitter <= 1` the jittered delay for `k` never exceeds the
//! unjittered delay for `k + 1`, so the sequence is non-decreasing whatever
//! values `u` takes.

use crate::config::Config;
use async_trait::async_trait;
use std::time::Duration;

/// Attempt budget and backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per task, first attempt included
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    /// Fraction in [0, 1]
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.crawler.retries.max(1),
            base: config.backoff_base(),
            cap: config.backoff_max(),
            jitter: config.crawler.backoff_jitter.clamp(0.0, 1.0),
        }
    }

    /// Returns true if another attempt is allowed after `attempts` attempts
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff after `failed_attempts` failures, for a jitter draw `u` in [0, 1)
    pub fn backoff_with(&self, failed_attempts: u32, u: f64) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(62) as i32;
        let u = u.clamp(0.0, 1.0);
        let secs = self.base.as_secs_f64() * 2f64.powi(exponent) * (1.0 + u * self.jitter);
        let capped = secs.min(self.cap.as_secs_f64());
        Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(self.cap)
    }

    /// Backoff after `failed_attempts` failures with a random jitter draw
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        self.backoff_with(failed_attempts, rand::random::<f64>())
    }
}

/// Retry bookkeeping of one in-flight task
///
/// Lives only while its task is being fetched.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempts: u32,
    pub backoffs: Vec<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed attempt
    ///
    /// Returns the wait before the next attempt, or `None` once the attempt
    /// budget is spent.
    pub fn schedule_retry(&mut self, policy: &RetryPolicy) -> Option<Duration> {
        if !policy.should_retry(self.attempts) {
            return None;
        }
        let delay = policy.backoff(self.attempts);
        self.backoffs.push(delay);
        Some(delay)
    }
}

/// Something that can wait
///
/// Production code sleeps on the tokio timer; tests substitute a recorder.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
