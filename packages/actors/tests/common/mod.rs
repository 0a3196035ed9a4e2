#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use db::{DbConfig, JobStore};
use queue_core::{DispatchConfig, JobEvent, ManualClock, RateLimitConfig, SystemClock};
use tokio::sync::mpsc;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub struct Harness {
    pub store: JobStore,
    pub clock: ManualClock,
    pub config: DispatchConfig,
}

/// Pool settings tuned for tests: quick polls, no practical rate limit and
/// completed rows kept for inspection.
pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        concurrency: 2,
        rate_limit: RateLimitConfig {
            max: 1000,
            window_ms: 1000,
        },
        poll_interval_ms: 10,
        remove_on_complete: false,
        ..DispatchConfig::default()
    }
}

pub async fn harness(config: DispatchConfig) -> Result<Harness, Box<dyn std::error::Error>> {
    let db = db::init(&DbConfig::memory()).await?;
    let clock = ManualClock::new();
    let store = db::job_store(db, Arc::new(clock.clone()), &config);
    Ok(Harness {
        store,
        clock,
        config,
    })
}

/// Store on the system clock, for tests that depend on real lease expiry.
pub async fn wall_clock_store(config: &DispatchConfig) -> Result<JobStore, Box<dyn std::error::Error>> {
    let db = db::init(&DbConfig::memory()).await?;
    Ok(db::job_store(db, Arc::new(SystemClock), config))
}

pub fn mail_payload(to: &str) -> serde_json::Value {
    serde_json::json!({
        "to": to,
        "subject": "Verify your email",
        "html": "<p>Your verification code is: <strong>123456</strong></p>"
    })
}

/// Wait for the next pool event, failing the test if none arrives.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<JobEvent>) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for a job event")
        .expect("event channel closed")
}
