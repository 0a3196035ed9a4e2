//! Events emitted by workers when an execution settles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// One event per settled execution: either the job completed or the
/// execution failed (and the job was rescheduled or dead-lettered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was delivered.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        attempts: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// An execution failed.
    JobFailed {
        job_id: JobId,
        worker_id: String,
        error: String,
        attempts: u32,
        /// `Some` when the job was rescheduled with this delay.
        retry_in_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobCompleted { job_id, .. } => *job_id,
            JobEvent::JobFailed { job_id, .. } => *job_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            JobEvent::JobCompleted { attempts, .. } => *attempts,
            JobEvent::JobFailed { attempts, .. } => *attempts,
        }
    }

    /// Whether the job reached a terminal state with this event.
    pub fn is_terminal(&self) -> bool {
        match self {
            JobEvent::JobCompleted { .. } => true,
            JobEvent::JobFailed { retry_in_ms, .. } => retry_in_ms.is_none(),
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobCompleted {
                job_id,
                attempts,
                duration_ms,
                ..
            } => format!(
                "Job {} completed on attempt {} in {}ms",
                job_id, attempts, duration_ms
            ),
            JobEvent::JobFailed {
                job_id,
                error,
                attempts,
                retry_in_ms,
                ..
            } => match retry_in_ms {
                Some(delay) => format!(
                    "Job {} failed on attempt {}: {} (retry in {}ms)",
                    job_id, attempts, error, delay
                ),
                None => format!(
                    "Job {} failed after {} attempts: {}",
                    job_id, attempts, error
                ),
            },
        }
    }
}
