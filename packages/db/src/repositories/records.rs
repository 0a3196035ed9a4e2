//! Row types as stored in SurrealDB.

use chrono::{DateTime, Utc};
use queue_core::{BackoffPolicy, DeadLetterRecord, Job, JobId, JobStatus, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Internal record type for the `job` table.
///
/// The SurrealDB record id is `job:<job_id>`; `job_id` is duplicated as a
/// plain field so rows deserialize without touching record ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JobRecord {
    pub job_id: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Bumped on every mutation; claims compare-and-set against it.
    pub revision: u64,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<i64>,
    pub eligible_at: i64,
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub last_error: Option<String>,
}

impl JobRecord {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            status: job.status,
            attempts: job.attempts,
            max_attempts: job.retry.max_attempts,
            backoff: job.retry.backoff,
            revision: 0,
            lease_owner: job.lease_owner.clone(),
            lease_expires_at: job.lease_expires_at.map(to_millis),
            eligible_at: to_millis(job.eligible_at),
            created_at: to_millis(job.created_at),
            last_attempt_at: job.last_attempt_at.map(to_millis),
            completed_at: job.completed_at.map(to_millis),
            failed_at: job.failed_at.map(to_millis),
            last_error: job.last_error.clone(),
        }
    }

    pub fn into_job(self) -> Result<Job, StoreError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| StoreError::Serialization(format!("bad job id {}: {}", self.job_id, e)))?;
        Ok(Job {
            id,
            job_type: self.job_type,
            payload: self.payload,
            status: self.status,
            attempts: self.attempts,
            retry: RetryPolicy::new(self.max_attempts, self.backoff),
            lease_owner: self.lease_owner,
            lease_expires_at: self.lease_expires_at.map(from_millis).transpose()?,
            eligible_at: from_millis(self.eligible_at)?,
            created_at: from_millis(self.created_at)?,
            last_attempt_at: self.last_attempt_at.map(from_millis).transpose()?,
            completed_at: self.completed_at.map(from_millis).transpose()?,
            failed_at: self.failed_at.map(from_millis).transpose()?,
            last_error: self.last_error,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Internal record type for the `dead_letter` table.
#[derive(Debug, Deserialize)]
pub(crate) struct DeadLetterRow {
    pub job: JobRecord,
    pub reason: String,
    pub failed_at: i64,
}

impl DeadLetterRow {
    pub fn into_record(self) -> Result<DeadLetterRecord, StoreError> {
        Ok(DeadLetterRecord {
            job: self.job.into_job()?,
            reason: self.reason,
            failed_at: from_millis(self.failed_at)?,
        })
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Serialization(format!("timestamp out of range: {}", ms)))
}

fn duration_millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// `now + after` in milliseconds, capped at the latest representable instant
/// so every stored timestamp converts back to a `DateTime`.
pub(crate) fn deadline(now: i64, after: std::time::Duration) -> i64 {
    now.saturating_add(duration_millis(after))
        .min(DateTime::<Utc>::MAX_UTC.timestamp_millis())
}
