//! Actor system for the mail dispatch queue.
//!
//! This crate provides the Ractor-based worker pool that drains the durable
//! job store.
//!
//! # Architecture
//!
//! - `PoolSupervisor` - Owns the workers, restarts crashed ones and runs
//!   dead-letter housekeeping
//! - `WorkerActor` - Leases one job at a time, runs its handler and settles it
//! - `RateLimiter` - Caps execution starts per window across all workers
//!
//! # Usage
//!
//! ```ignore
//! use actors::{HandlerRegistry, WorkerPool};
//!
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let pool = WorkerPool::start(store, handlers, Some(tx), &config).await?;
//! // ...
//! pool.shutdown(config.shutdown_grace()).await?;
//! ```

mod handler;
mod messages;
mod rate_limiter;
mod supervisor;
mod worker_actor;

pub use handler::{DeliveryHandler, DeliveryOutcome, FnHandler, HandlerFuture, HandlerRegistry};
pub use messages::{PoolError, PoolMessage, WorkerMessage};
pub use rate_limiter::RateLimiter;
pub use supervisor::{PoolArgs, PoolSupervisor, ShutdownReport, WorkerPool};
pub use worker_actor::{EventSender, WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
