//! Message types for actor communication.

use ractor::{ActorRef, RpcReplyPort};

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Try to lease and run one job.
    Poll,
}

/// Messages for the pool supervisor.
#[derive(Debug)]
pub enum PoolMessage {
    /// Periodic dead-letter eviction and queue stats.
    Housekeeping,

    /// IDs of the live workers.
    Workers { reply: RpcReplyPort<Vec<String>> },

    /// Stop respawning workers and hand them over for shutdown.
    Drain {
        reply: RpcReplyPort<Vec<ActorRef<WorkerMessage>>>,
    },
}

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to spawn actor: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("Pool supervisor unreachable: {0}")]
    Unreachable(String),

    #[error("Timeout")]
    Timeout,
}
