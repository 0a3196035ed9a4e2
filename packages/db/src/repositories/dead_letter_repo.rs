//! Dead-letter store with dual count/age retention.

use std::sync::Arc;

use queue_core::{Clock, DeadLetterRecord, JobId, RetentionPolicy};
use serde::Deserialize;

use super::records::{DeadLetterRow, to_millis};
use crate::{Database, StoreError};

/// Read-mostly view over permanently failed jobs.
///
/// Records are inserted by [`JobStore::fail`](crate::JobStore::fail) and only
/// ever removed by eviction, which also removes the `failed` job rows they
/// snapshot. Reads skip records outside the age window even before the next
/// eviction pass removes them.
#[derive(Clone)]
pub struct DeadLetterStore {
    db: Database,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
}

#[derive(Debug, Deserialize)]
struct EvictionRow {
    job_id: String,
}

impl DeadLetterStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>, retention: RetentionPolicy) -> Self {
        Self {
            db,
            clock,
            retention,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    fn cutoff_ms(&self) -> i64 {
        to_millis(self.retention.cutoff(self.clock.now()))
    }

    /// Newest records first.
    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DeadLetterRecord>, StoreError> {
        let mut response = self
            .db
            .query(
                r#"
                SELECT * FROM dead_letter
                WHERE failed_at >= $cutoff
                ORDER BY failed_at DESC, job_id DESC
                LIMIT $limit START $offset
                "#,
            )
            .bind(("cutoff", self.cutoff_ms()))
            .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
            .bind(("offset", i64::try_from(offset).unwrap_or(i64::MAX)))
            .await?;

        let rows: Vec<DeadLetterRow> = response.take(0)?;
        rows.into_iter().map(DeadLetterRow::into_record).collect()
    }

    /// Get the dead-letter record of a job, if it is retained.
    pub async fn get(&self, job_id: JobId) -> Result<Option<DeadLetterRecord>, StoreError> {
        let mut response = self
            .db
            .query("SELECT * FROM dead_letter WHERE job_id = $job_id AND failed_at >= $cutoff LIMIT 1")
            .bind(("job_id", job_id.to_string()))
            .bind(("cutoff", self.cutoff_ms()))
            .await?;

        let rows: Vec<DeadLetterRow> = response.take(0)?;
        rows.into_iter().next().map(DeadLetterRow::into_record).transpose()
    }

    /// Number of retained records.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let mut response = self
            .db
            .query("SELECT count() AS count FROM dead_letter WHERE failed_at >= $cutoff GROUP ALL")
            .bind(("cutoff", self.cutoff_ms()))
            .await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let counts: Vec<CountResult> = response.take(0)?;
        Ok(counts
            .first()
            .map_or(0, |c| u64::try_from(c.count).unwrap_or(0)))
    }

    /// Evict records older than the age window, then everything beyond the
    /// newest `max_count`, together with their `failed` job rows. Returns the
    /// number of evicted records.
    pub async fn enforce_retention(&self) -> Result<usize, StoreError> {
        let mut response = self
            .db
            .query(
                r#"
                DELETE dead_letter WHERE failed_at < $cutoff RETURN BEFORE;
                DELETE job WHERE status = "failed" AND failed_at < $cutoff;
                SELECT job_id, failed_at FROM dead_letter
                ORDER BY failed_at DESC, job_id DESC
                START $keep;
                "#,
            )
            .bind(("cutoff", self.cutoff_ms()))
            .bind((
                "keep",
                i64::try_from(self.retention.max_count).unwrap_or(i64::MAX),
            ))
            .await?;

        let expired: Vec<EvictionRow> = response.take(0)?;
        let excess: Vec<EvictionRow> = response.take(2)?;

        if !excess.is_empty() {
            let ids: Vec<String> = excess.iter().map(|row| row.job_id.clone()).collect();
            self.db
                .query(
                    r#"
                    DELETE dead_letter WHERE job_id INSIDE $ids;
                    DELETE job WHERE status = "failed" AND job_id INSIDE $ids;
                    "#,
                )
                .bind(("ids", ids))
                .await?
                .check()?;
        }

        let evicted = expired.len() + excess.len();
        if evicted > 0 {
            tracing::debug!(
                "Evicted {} dead letters ({} expired, {} over count)",
                evicted,
                expired.len(),
                excess.len()
            );
        }
        Ok(evicted)
    }
}
