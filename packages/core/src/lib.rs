//! Core domain types for the mail dispatch queue.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and Lease for work items
//! - Retry and backoff policy
//! - Dead-letter records and retention
//! - Worker events and dispatcher configuration

mod backoff;
mod clock;
mod config;
mod dead_letter;
mod events;
mod job;

pub use backoff::{Backoff, BackoffKind, BackoffPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use self::config::{BackoffConfig, ConfigError, DeadLetterConfig, DispatchConfig, RateLimitConfig};
pub use dead_letter::{DeadLetterRecord, RetentionPolicy};
pub use events::JobEvent;
pub use job::{Job, JobId, JobStatus, Lease, RetryPolicy};
