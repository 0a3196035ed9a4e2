//! Pool supervisor: spawns the workers, restarts crashed ones and runs
//! periodic housekeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use db::JobStore;
use futures_util::future::join_all;
use queue_core::DispatchConfig;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use ulid::Ulid;

use crate::handler::HandlerRegistry;
use crate::messages::{PoolError, PoolMessage, WorkerMessage};
use crate::rate_limiter::RateLimiter;
use crate::worker_actor::{EventSender, WorkerActor, WorkerArgs};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Arguments for the pool supervisor.
pub struct PoolArgs {
    pub store: JobStore,
    pub handlers: HandlerRegistry,
    pub events: Option<EventSender>,
    pub config: DispatchConfig,
}

/// State for the pool supervisor.
pub struct PoolState {
    pool_id: Ulid,
    store: JobStore,
    /// Template for new workers; only `worker_id` differs between them.
    worker_args: WorkerArgs,
    workers: HashMap<ActorId, (String, ActorRef<WorkerMessage>)>,
    draining: bool,
    worker_counter: u64,
}

impl PoolState {
    fn next_worker_id(&mut self) -> String {
        self.worker_counter += 1;
        format!("{}-worker-{}", self.pool_id, self.worker_counter)
    }

    async fn spawn_worker(
        &mut self,
        myself: &ActorRef<PoolMessage>,
    ) -> Result<(), ActorProcessingErr> {
        let worker_id = self.next_worker_id();
        let args = WorkerArgs {
            worker_id: worker_id.clone(),
            ..self.worker_args.clone()
        };

        let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

        self.workers.insert(worker.get_id(), (worker_id, worker));
        Ok(())
    }
}

/// Supervisor actor owning a fixed number of workers.
pub struct PoolSupervisor;

impl Actor for PoolSupervisor {
    type Msg = PoolMessage;
    type State = PoolState;
    type Arguments = PoolArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let config = args.config;
        let pool_id = Ulid::new();
        tracing::info!(
            "Starting worker pool {} with {} workers",
            pool_id,
            config.concurrency
        );

        let worker_args = WorkerArgs {
            worker_id: String::new(),
            store: args.store.clone(),
            limiter: RateLimiter::new(config.rate_limit.max, config.rate_window()),
            handlers: Arc::new(args.handlers),
            events: args.events,
            lease_duration: config.lease_duration(),
            poll_interval: config.poll_interval(),
        };

        let mut state = PoolState {
            pool_id,
            store: args.store,
            worker_args,
            workers: HashMap::new(),
            draining: false,
            worker_counter: 0,
        };
        for _ in 0..config.concurrency {
            state.spawn_worker(&myself).await?;
        }

        // Periodic housekeeping
        let period = config.housekeeping_interval();
        let myself_clone = myself.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if myself_clone.send_message(PoolMessage::Housekeeping).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PoolMessage::Housekeeping => {
                match state.store.dead_letters().enforce_retention().await {
                    Ok(evicted) if evicted > 0 => {
                        tracing::info!("Housekeeping evicted {} dead letters", evicted);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Dead-letter eviction failed: {}", e),
                }
                if let Ok(counts) = state.store.count_by_status().await {
                    tracing::debug!("Pool {} job counts: {:?}", state.pool_id, counts);
                }
            }

            PoolMessage::Workers { reply } => {
                let mut ids: Vec<String> =
                    state.workers.values().map(|(id, _)| id.clone()).collect();
                ids.sort();
                let _ = reply.send(ids);
            }

            PoolMessage::Drain { reply } => {
                state.draining = true;
                let workers = state.workers.values().map(|(_, w)| w.clone()).collect();
                let _ = reply.send(workers);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (cell, reason) = match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                (cell, reason.unwrap_or_else(|| "stopped".to_string()))
            }
            SupervisionEvent::ActorFailed(cell, err) => (cell, err.to_string()),
            _ => return Ok(()),
        };

        let Some((worker_id, _)) = state.workers.remove(&cell.get_id()) else {
            return Ok(());
        };
        if state.draining {
            tracing::debug!("Worker {} exited during shutdown: {}", worker_id, reason);
            return Ok(());
        }

        tracing::warn!("Worker {} terminated unexpectedly ({}); restarting", worker_id, reason);
        state.spawn_worker(&myself).await
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!("Worker pool {} stopped", state.pool_id);
        Ok(())
    }
}

/// How a shutdown went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that finished their execution within the grace period.
    pub stopped: usize,
    /// Workers still busy after the grace period; their leases are left to
    /// expire.
    pub killed: usize,
}

/// Handle to a running worker pool.
pub struct WorkerPool {
    supervisor: ActorRef<PoolMessage>,
    handle: tokio::task::JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn the supervisor and `config.concurrency` workers.
    ///
    /// Events are sent on `events` if given, one per settled execution.
    pub async fn start(
        store: JobStore,
        handlers: HandlerRegistry,
        events: Option<EventSender>,
        config: &DispatchConfig,
    ) -> Result<Self, PoolError> {
        let args = PoolArgs {
            store,
            handlers,
            events,
            config: config.clone(),
        };
        let (supervisor, handle) = Actor::spawn(None, PoolSupervisor, args).await?;
        Ok(Self { supervisor, handle })
    }

    /// IDs of the live workers.
    pub async fn workers(&self) -> Result<Vec<String>, PoolError> {
        let result = ractor::rpc::call(
            &self.supervisor,
            |reply| PoolMessage::Workers { reply },
            Some(CALL_TIMEOUT),
        )
        .await;
        unwrap_call(result)
    }

    /// Stop all workers, giving in-flight executions up to `grace` to finish.
    pub async fn shutdown(self, grace: Duration) -> Result<ShutdownReport, PoolError> {
        tracing::info!("Shutting down worker pool (grace {:?})", grace);

        let result = ractor::rpc::call(
            &self.supervisor,
            |reply| PoolMessage::Drain { reply },
            Some(CALL_TIMEOUT),
        )
        .await;
        let workers = unwrap_call(result)?;

        let stops = workers
            .iter()
            .map(|w| w.stop_and_wait(Some("shutdown".to_string()), Some(grace)));
        let results = join_all(stops).await;

        let mut report = ShutdownReport::default();
        for (worker, result) in workers.iter().zip(results) {
            match result {
                Ok(()) => report.stopped += 1,
                Err(e) => {
                    tracing::warn!(
                        "Worker {:?} still busy after grace period ({}); killing it",
                        worker.get_id(),
                        e
                    );
                    worker.kill();
                    report.killed += 1;
                }
            }
        }

        self.supervisor.stop(Some("shutdown".to_string()));
        if let Err(e) = self.handle.await {
            tracing::warn!("Pool supervisor exited abnormally: {}", e);
        }
        Ok(report)
    }
}

fn unwrap_call<T, M: std::fmt::Debug>(
    result: Result<CallResult<T>, ractor::MessagingErr<M>>,
) -> Result<T, PoolError> {
    match result {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(PoolError::Timeout),
        Ok(CallResult::SenderError) => {
            Err(PoolError::Unreachable("reply channel dropped".to_string()))
        }
        Err(e) => Err(PoolError::Unreachable(e.to_string())),
    }
}
