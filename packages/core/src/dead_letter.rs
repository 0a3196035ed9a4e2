//! Dead-letter records and their retention rule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Job;

/// Snapshot of a job taken when it failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// The job as it was at the failing transition.
    pub job: Job,
    /// Terminal error reason.
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Dual bound on dead-letter retention.
///
/// A record is kept only while it is among the newest `max_count` records
/// and younger than `max_age`. Each bound evicts on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_count: usize,
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_count: 100,
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RetentionPolicy {
    /// Records that failed before this instant are outside the age window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_expired(&self, failed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        failed_at < self.cutoff(now)
    }
}
