//! Database schema definitions using SurrealQL.
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch so that
//! eligibility and lease expiry compare numerically against the store clock.

use crate::{Database, StoreError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes.
pub async fn init_schema(db: &Database) -> Result<(), StoreError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(DEAD_LETTER_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
const JOB_SCHEMA: &str = r#"
-- Job table; payload and backoff stay schemaless
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string
    ASSERT $value INSIDE ["waiting", "active", "delayed", "completed", "failed"];
DEFINE FIELD IF NOT EXISTS attempts ON job TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS max_attempts ON job TYPE int DEFAULT 3;
DEFINE FIELD IF NOT EXISTS revision ON job TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS lease_owner ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS lease_expires_at ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS eligible_at ON job TYPE int;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE int;
DEFINE FIELD IF NOT EXISTS last_attempt_at ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS completed_at ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS failed_at ON job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS last_error ON job TYPE option<string>;

-- Claim polling: eligible jobs by status and eligibility time
DEFINE INDEX IF NOT EXISTS job_status_eligible ON job FIELDS status, eligible_at;
DEFINE INDEX IF NOT EXISTS job_lease_expiry ON job FIELDS status, lease_expires_at;
"#;

/// Dead-letter table schema.
const DEAD_LETTER_SCHEMA: &str = r#"
-- Snapshots of permanently failed jobs, keyed by job id
DEFINE TABLE IF NOT EXISTS dead_letter SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON dead_letter TYPE string;
DEFINE FIELD IF NOT EXISTS reason ON dead_letter TYPE string;
DEFINE FIELD IF NOT EXISTS failed_at ON dead_letter TYPE int;

DEFINE INDEX IF NOT EXISTS dead_letter_failed ON dead_letter FIELDS failed_at;
"#;
