#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use db::{DbConfig, JobStore, StoreError};
use queue_core::{BackoffPolicy, Clock, DispatchConfig, ManualClock, RetryPolicy};

pub const LEASE: Duration = Duration::from_secs(30);

pub struct TestStore {
    pub store: JobStore,
    pub clock: ManualClock,
}

impl TestStore {
    /// The instant `by` from now on the test clock.
    pub fn after(&self, by: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::from_std(by).expect("duration in range")
    }
}

/// Fresh in-memory datastore per test.
pub async fn setup(config: DispatchConfig) -> Result<TestStore, StoreError> {
    let db = db::init(&DbConfig::memory()).await?;
    let clock = ManualClock::new();
    let store = db::job_store(db, Arc::new(clock.clone()), &config);
    Ok(TestStore { store, clock })
}

pub async fn setup_default() -> Result<TestStore, StoreError> {
    setup(DispatchConfig {
        remove_on_complete: false,
        ..DispatchConfig::default()
    })
    .await
}

pub fn policy(max_attempts: u32, base_delay_ms: u64) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        BackoffPolicy::exponential(Duration::from_millis(base_delay_ms)),
    )
}

pub fn mail_payload(to: &str) -> serde_json::Value {
    serde_json::json!({
        "to": to,
        "subject": "Verify your email",
        "html": "<p>Your verification code is: <strong>123456</strong></p>"
    })
}
