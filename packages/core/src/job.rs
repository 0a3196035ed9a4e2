//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::backoff::{Backoff, BackoffPolicy};

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is eligible as soon as a worker polls.
    #[default]
    Waiting,
    /// Job is leased by a worker.
    Active,
    /// Job failed transiently and waits for its backoff to elapse.
    Delayed,
    /// Job was delivered.
    Completed,
    /// Job failed permanently and was dead-lettered.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Delayed => "delayed",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt ceiling and backoff applied to a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of executions, including the first one.
    pub max_attempts: u32,
    /// Delay schedule between executions.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Decide what happens after execution number `attempt` failed transiently.
    pub fn next_delay(&self, attempt: u32) -> Backoff {
        self.backoff.next_delay(attempt, self.max_attempts)
    }
}

/// Exclusive, time-bounded claim of one worker over one job.
///
/// The `(job_id, worker_id, attempt)` triple identifies a single execution;
/// every store mutation after the lease is conditioned on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub job_id: JobId,
    pub worker_id: String,
    pub attempt: u32,
    pub expires_at: DateTime<Utc>,
}

/// A job represents a unit of work to be executed by the queue system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Type of job (used for routing to handlers).
    pub job_type: String,
    /// Job payload as JSON.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Number of executions started so far.
    pub attempts: u32,
    /// Attempt ceiling and backoff.
    pub retry: RetryPolicy,
    /// Worker currently holding the lease.
    pub lease_owner: Option<String>,
    /// When the current lease lapses.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Earliest time the job may be leased.
    pub eligible_at: DateTime<Utc>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the most recent execution started.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    /// Reason of the most recent failed execution.
    pub last_error: Option<String>,
}

impl Job {
    /// Create a new waiting job, eligible at `now`.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        retry: RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Waiting,
            attempts: 0,
            retry,
            lease_owner: None,
            lease_expires_at: None,
            eligible_at: now,
            created_at: now,
            last_attempt_at: None,
            completed_at: None,
            failed_at: None,
            last_error: None,
        }
    }

    /// The lease held on this job, if it is active.
    pub fn lease(&self) -> Option<Lease> {
        if self.status != JobStatus::Active {
            return None;
        }
        Some(Lease {
            job_id: self.id,
            worker_id: self.lease_owner.clone()?,
            attempt: self.attempts,
            expires_at: self.lease_expires_at?,
        })
    }

    /// Whether attempts are used up.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.retry.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_only_exists_while_active() {
        let now = Utc::now();
        let mut job = Job::new("send", serde_json::json!({}), RetryPolicy::default(), now);
        assert!(job.lease().is_none());

        job.status = JobStatus::Active;
        job.attempts = 1;
        job.lease_owner = Some("w-1".into());
        job.lease_expires_at = Some(now);

        let lease = job.lease().unwrap();
        assert_eq!(lease.worker_id, "w-1");
        assert_eq!(lease.attempt, 1);

        job.status = JobStatus::Completed;
        assert!(job.lease().is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Delayed.is_terminal());
        assert_eq!(JobStatus::Delayed.to_string(), "delayed");
    }
}
