use actors::PoolError;
use db::StoreError;
use queue_core::ConfigError;
use thiserror::Error;

/// Why a send request was not enqueued.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The template needs an argument the caller did not supply.
    #[error("Missing template argument: {0}")]
    MissingArgument(&'static str),
}

/// Dispatcher startup errors.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Store initialization failed: {0}")]
    Store(#[from] StoreError),
    #[error("Worker pool failed to start: {0}")]
    Pool(#[from] PoolError),
}
