//! Repository implementations for database operations.

mod dead_letter_repo;
mod job_repo;
mod records;

pub use dead_letter_repo::DeadLetterStore;
pub use job_repo::{JobStore, LeasePoll};
