//! Retry delay schedule.
//!
//! The delay after failed execution `n` (1-based) is `base_delay × 2^(n-1)`.
//! Once `n` reaches the attempt ceiling the job is [`Backoff::Exhausted`].
//!
//! ```
//! use std::time::Duration;
//! use queue_core::{Backoff, BackoffPolicy};
//!
//! let policy = BackoffPolicy::exponential(Duration::from_secs(5));
//! assert_eq!(policy.next_delay(1, 3), Backoff::Retry(Duration::from_secs(5)));
//! assert_eq!(policy.next_delay(2, 3), Backoff::Retry(Duration::from_secs(10)));
//! assert_eq!(policy.next_delay(3, 3), Backoff::Exhausted);
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Shape of the delay curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Exponential,
}

/// Backoff parameters stored with every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(rename = "type", default)]
    pub kind: BackoffKind,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Draw each delay uniformly from `[0, computed]` instead of using it as is.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(5))
    }
}

/// Outcome of consulting the policy after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Run again once this delay has elapsed.
    Retry(Duration),
    /// No attempts left.
    Exhausted,
}

impl BackoffPolicy {
    /// Deterministic exponential policy.
    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
            jitter: false,
        }
    }

    /// Enable full jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Un-jittered delay following failed execution `attempt`.
    ///
    /// Saturates at `u64::MAX` milliseconds instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
        match self.kind {
            BackoffKind::Exponential => {
                Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
            }
        }
    }

    /// Delay following failed execution `attempt`, or `Exhausted` once
    /// `attempt >= max_attempts`.
    pub fn next_delay(&self, attempt: u32, max_attempts: u32) -> Backoff {
        if attempt >= max_attempts {
            return Backoff::Exhausted;
        }

        let delay = self.delay_for(attempt);
        if !self.jitter {
            return Backoff::Retry(delay);
        }

        let upper = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let jittered = rand::thread_rng().gen_range(0..=upper);
        Backoff::Retry(Duration::from_millis(jittered))
    }
}
