//! SurrealDB integration for the mail dispatch queue.
//!
//! This crate provides database connectivity, the durable job store and the
//! dead-letter store.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod error;
mod schema;
pub mod repositories;

use std::sync::Arc;

use queue_core::{Clock, DispatchConfig};

pub use connection::{Database, DbConfig, connect_db};
pub use error::StoreError;
pub use repositories::{DeadLetterStore, JobStore, LeasePoll};
pub use schema::init_schema;

/// Connect to the database and make sure the schema exists.
///
/// This should be called once at application startup; the returned handle is
/// passed to the stores.
pub async fn init(config: &DbConfig) -> Result<Database, StoreError> {
    let db = connect_db(config).await?;
    init_schema(&db).await?;
    Ok(db)
}

/// Build the job and dead-letter stores for a dispatcher configuration.
pub fn job_store(db: Database, clock: Arc<dyn Clock>, config: &DispatchConfig) -> JobStore {
    let dead_letters = DeadLetterStore::new(db.clone(), clock.clone(), config.retention());
    JobStore::new(db, clock, dead_letters).with_remove_on_complete(config.remove_on_complete)
}
