use thiserror::Error;

/// Job store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The datastore could not be reached or rejected the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] surrealdb::Error),
    /// The caller no longer owns the lease it is acting on.
    #[error("Lease lost for job {0}")]
    LeaseLost(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}
