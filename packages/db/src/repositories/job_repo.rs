//! Durable job store with lease-based exclusive dequeue.
//!
//! Every transition out of `active` is a single conditional statement guarded
//! by the lease triple `(status = active, lease_owner, attempts)`. Claims are
//! compare-and-set on the row `revision`, so two workers that pick the same
//! candidate can never both win it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use queue_core::{Clock, DeadLetterRecord, Job, JobId, JobStatus, Lease, RetryPolicy};
use serde::{Deserialize, Serialize};

use super::dead_letter_repo::DeadLetterStore;
use super::records::{DeadLetterRow, JobRecord, deadline, from_millis, to_millis};
use crate::{Database, StoreError};

/// Candidates fetched per claim round.
const CLAIM_BATCH: i64 = 8;
/// Claim rounds before giving up on a contended poll.
const CLAIM_ROUNDS: usize = 4;

const EXPIRED_FINAL_ATTEMPT: &str = "lease expired after final attempt";

const SELECT_ELIGIBLE: &str = r#"
    SELECT * FROM job
    WHERE (status INSIDE ["waiting", "delayed"] AND eligible_at <= $now)
       OR (status = "active" AND lease_expires_at <= $now)
    ORDER BY eligible_at ASC, created_at ASC
    LIMIT $limit
"#;

const CLAIM: &str = r#"
    UPDATE type::thing("job", $id) SET
        status = "active",
        lease_owner = $worker,
        lease_expires_at = $expires,
        last_attempt_at = $now,
        attempts += 1,
        revision += 1
    WHERE revision = $revision
    RETURN AFTER
"#;

const LEASE_GUARD: &str = r#"status = "active" AND lease_owner = $worker AND attempts = $attempt"#;
const REVISION_GUARD: &str = "revision = $revision";

/// Who is allowed to move a job to `failed`.
enum FailGuard<'a> {
    /// The worker holding the lease.
    Lease(&'a Lease),
    /// Whoever observed this revision of an abandoned row.
    Revision(u64),
}

/// Parameters bound into lease-guarded statements.
#[derive(Debug, Serialize)]
struct LeaseParams {
    id: String,
    worker: String,
    attempt: u32,
    revision: u64,
    now: i64,
    expires: Option<i64>,
    eligible: Option<i64>,
    reason: Option<String>,
}

impl LeaseParams {
    fn for_lease(lease: &Lease, now: i64) -> Self {
        Self {
            id: lease.job_id.to_string(),
            worker: lease.worker_id.clone(),
            attempt: lease.attempt,
            revision: 0,
            now,
            expires: None,
            eligible: None,
            reason: None,
        }
    }
}

/// Outcome of one lease poll.
#[derive(Debug, Default)]
pub struct LeasePoll {
    /// The job now leased to the caller.
    pub job: Option<Job>,
    /// Jobs dead-lettered during the poll because the lease on their final
    /// attempt had expired.
    pub expired: Vec<DeadLetterRecord>,
}

/// Durable job store.
///
/// Cheap to clone; clones share the connection, clock and dead-letter store.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
    clock: Arc<dyn Clock>,
    dead_letters: DeadLetterStore,
    remove_on_complete: bool,
}

impl JobStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>, dead_letters: DeadLetterStore) -> Self {
        Self {
            db,
            clock,
            dead_letters,
            remove_on_complete: true,
        }
    }

    /// Keep completed rows instead of deleting them on ack.
    pub fn with_remove_on_complete(mut self, remove: bool) -> Self {
        self.remove_on_complete = remove;
        self
    }

    pub fn dead_letters(&self) -> &DeadLetterStore {
        &self.dead_letters
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn now_ms(&self) -> i64 {
        to_millis(self.clock.now())
    }

    /// Create a waiting job, eligible immediately.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        policy: RetryPolicy,
    ) -> Result<JobId, StoreError> {
        let job = Job::new(job_type, payload, policy, self.clock.now());
        let record = JobRecord::from_job(&job);

        let created: Option<JobRecord> = self
            .db
            .create(("job", job.id.to_string()))
            .content(record)
            .await?;

        created
            .map(|_| job.id)
            .ok_or_else(|| StoreError::Query(format!("Failed to create job {}", job.id)))
    }

    /// Claim the eligible job with the earliest eligibility time.
    ///
    /// Eligible means `waiting`, `delayed` with its delay elapsed, or `active`
    /// with an expired lease. An expired lease on a job with no attempts left
    /// is dead-lettered instead of reclaimed.
    pub async fn lease_next(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<Job>, StoreError> {
        Ok(self.poll(worker_id, lease_duration).await?.job)
    }

    /// Like [`lease_next`](Self::lease_next), also reporting the jobs the poll
    /// dead-lettered on the way.
    pub async fn poll(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<LeasePoll, StoreError> {
        let mut poll = LeasePoll::default();
        let mut last_error = None;

        for _ in 0..CLAIM_ROUNDS {
            let now = self.now_ms();
            let candidates = self.eligible(now).await?;
            if candidates.is_empty() {
                return Ok(poll);
            }

            for candidate in candidates {
                if candidate.status == JobStatus::Active && candidate.is_exhausted() {
                    match self.expire_exhausted(&candidate, now).await {
                        Ok(Some(record)) => poll.expired.push(record),
                        Ok(None) => {}
                        Err(e) => last_error = Some(e),
                    }
                    continue;
                }

                match self.try_claim(&candidate, worker_id, now, lease_duration).await {
                    Ok(Some(job)) => {
                        tracing::debug!(
                            "Worker {} leased job {} (attempt {})",
                            worker_id,
                            job.id,
                            job.attempts
                        );
                        poll.job = Some(job);
                        return Ok(poll);
                    }
                    Ok(None) => {
                        tracing::trace!("Job {} claimed by another worker", candidate.job_id);
                    }
                    Err(e) => {
                        tracing::debug!("Claim of job {} failed: {}", candidate.job_id, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(e) if poll.expired.is_empty() => Err(e),
            Some(e) => {
                tracing::debug!("Poll by {} ended with an error: {}", worker_id, e);
                Ok(poll)
            }
            None => Ok(poll),
        }
    }

    async fn eligible(&self, now: i64) -> Result<Vec<JobRecord>, StoreError> {
        let mut response = self
            .db
            .query(SELECT_ELIGIBLE)
            .bind(("now", now))
            .bind(("limit", CLAIM_BATCH))
            .await?;
        Ok(response.take(0)?)
    }

    async fn try_claim(
        &self,
        candidate: &JobRecord,
        worker_id: &str,
        now: i64,
        lease_duration: Duration,
    ) -> Result<Option<Job>, StoreError> {
        let mut response = self
            .db
            .query(CLAIM)
            .bind(("id", candidate.job_id.clone()))
            .bind(("worker", worker_id.to_string()))
            .bind(("expires", deadline(now, lease_duration)))
            .bind(("now", now))
            .bind(("revision", candidate.revision))
            .await?;

        let claimed: Vec<JobRecord> = response.take(0)?;
        claimed.into_iter().next().map(JobRecord::into_job).transpose()
    }

    async fn expire_exhausted(
        &self,
        candidate: &JobRecord,
        now: i64,
    ) -> Result<Option<DeadLetterRecord>, StoreError> {
        let id = JobId::parse(&candidate.job_id)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        match self
            .fail_guarded(
                id,
                FailGuard::Revision(candidate.revision),
                EXPIRED_FINAL_ATTEMPT,
                now,
            )
            .await
        {
            Ok(record) => {
                tracing::warn!(
                    "Job {} dead-lettered: {} ({} attempts)",
                    candidate.job_id,
                    EXPIRED_FINAL_ATTEMPT,
                    candidate.attempts
                );
                Ok(Some(record))
            }
            // Another poller expired it first.
            Err(StoreError::LeaseLost(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Extend a lease held by the caller.
    pub async fn renew_lease(
        &self,
        lease: &Lease,
        lease_duration: Duration,
    ) -> Result<Lease, StoreError> {
        let now = self.now_ms();
        let expires = deadline(now, lease_duration);
        let params = LeaseParams {
            expires: Some(expires),
            ..LeaseParams::for_lease(lease, now)
        };

        let query = format!(
            "UPDATE type::thing('job', $id) SET lease_expires_at = $expires, revision += 1 \
             WHERE {LEASE_GUARD} RETURN AFTER"
        );
        self.update_leased(&query, lease, params).await?;

        Ok(Lease {
            expires_at: from_millis(expires)?,
            ..lease.clone()
        })
    }

    /// Mark a leased job completed, deleting the row when configured to.
    pub async fn ack(&self, lease: &Lease) -> Result<(), StoreError> {
        let now = self.now_ms();
        let query = if self.remove_on_complete {
            format!("DELETE type::thing('job', $id) WHERE {LEASE_GUARD} RETURN BEFORE")
        } else {
            format!(
                "UPDATE type::thing('job', $id) SET status = 'completed', completed_at = $now, \
                 lease_owner = NONE, lease_expires_at = NONE, revision += 1 \
                 WHERE {LEASE_GUARD} RETURN AFTER"
            )
        };
        self.update_leased(&query, lease, LeaseParams::for_lease(lease, now))
            .await?;
        Ok(())
    }

    /// Release a leased job back to the queue after `delay`.
    pub async fn reschedule(
        &self,
        lease: &Lease,
        delay: Duration,
        reason: &str,
    ) -> Result<Job, StoreError> {
        let now = self.now_ms();
        let params = LeaseParams {
            eligible: Some(deadline(now, delay)),
            reason: Some(reason.to_string()),
            ..LeaseParams::for_lease(lease, now)
        };

        let query = format!(
            "UPDATE type::thing('job', $id) SET status = 'delayed', eligible_at = $eligible, \
             last_error = $reason, lease_owner = NONE, lease_expires_at = NONE, revision += 1 \
             WHERE {LEASE_GUARD} RETURN AFTER"
        );
        self.update_leased(&query, lease, params).await?.into_job()
    }

    /// Fail a leased job permanently and record it as a dead letter.
    pub async fn fail(&self, lease: &Lease, reason: &str) -> Result<DeadLetterRecord, StoreError> {
        self.fail_guarded(lease.job_id, FailGuard::Lease(lease), reason, self.now_ms())
            .await
    }

    /// Move a job to `failed` and write its dead-letter record in one
    /// transaction. The record is only written if the guarded update matched.
    async fn fail_guarded(
        &self,
        job_id: JobId,
        guard: FailGuard<'_>,
        reason: &str,
        now: i64,
    ) -> Result<DeadLetterRecord, StoreError> {
        let (condition, params) = match guard {
            FailGuard::Lease(lease) => (
                LEASE_GUARD,
                LeaseParams {
                    reason: Some(reason.to_string()),
                    ..LeaseParams::for_lease(lease, now)
                },
            ),
            FailGuard::Revision(revision) => (
                REVISION_GUARD,
                LeaseParams {
                    id: job_id.to_string(),
                    worker: String::new(),
                    attempt: 0,
                    revision,
                    now,
                    expires: None,
                    eligible: None,
                    reason: Some(reason.to_string()),
                },
            ),
        };

        let query = format!(
            r#"
            BEGIN TRANSACTION;
            LET $failed = (UPDATE type::thing('job', $id) SET
                status = 'failed',
                failed_at = $now,
                last_error = $reason,
                lease_owner = NONE,
                lease_expires_at = NONE,
                revision += 1
            WHERE {condition} RETURN AFTER);
            IF array::len($failed) > 0 {{
                CREATE type::thing('dead_letter', $id) CONTENT {{
                    job_id: $id,
                    job: $failed[0],
                    reason: $reason,
                    failed_at: $now
                }}
            }};
            SELECT * FROM type::thing('dead_letter', $id) WHERE array::len($failed) > 0;
            COMMIT TRANSACTION;
            "#
        );

        let mut response = self.db.query(query).bind(params).await?;
        // Statements: 0 the LET, 1 the conditional insert (always NONE), 2 the
        // read-back, empty when the guard did not match.
        let rows: Vec<DeadLetterRow> = response.take(2)?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::LeaseLost(job_id.to_string()))?
            .into_record()?;

        if let Err(e) = self.dead_letters.enforce_retention().await {
            tracing::warn!("Dead-letter retention pass failed: {}", e);
        }

        Ok(record)
    }

    /// Run a lease-guarded statement; no matching row means the lease is gone.
    async fn update_leased(
        &self,
        query: &str,
        lease: &Lease,
        params: LeaseParams,
    ) -> Result<JobRecord, StoreError> {
        let mut response = self.db.query(query).bind(params).await?;
        let records: Vec<JobRecord> = response.take(0)?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::LeaseLost(lease.job_id.to_string()))
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let record: Option<JobRecord> = self.db.select(("job", id.to_string())).await?;
        record.map(JobRecord::into_job).transpose()
    }

    /// Count jobs by status.
    pub async fn count_by_status(&self) -> Result<HashMap<JobStatus, u64>, StoreError> {
        let mut result = self
            .db
            .query("SELECT status, count() AS count FROM job GROUP BY status")
            .await?;

        #[derive(Deserialize)]
        struct StatusCount {
            status: JobStatus,
            count: i64,
        }

        let counts: Vec<StatusCount> = result.take(0)?;

        Ok(counts
            .into_iter()
            .map(|c| (c.status, u64::try_from(c.count).unwrap_or(0)))
            .collect())
    }
}
