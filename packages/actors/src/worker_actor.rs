//! Worker actor for executing jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use db::{JobStore, LeasePoll, StoreError};
use queue_core::{Backoff, Clock, DeadLetterRecord, Job, JobEvent, Lease};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::handler::{DeliveryOutcome, HandlerRegistry};
use crate::messages::WorkerMessage;
use crate::rate_limiter::RateLimiter;

/// Sender half of the pool's event channel.
pub type EventSender = mpsc::UnboundedSender<JobEvent>;

/// Worker actor arguments.
#[derive(Clone)]
pub struct WorkerArgs {
    pub worker_id: String,
    pub store: JobStore,
    pub limiter: RateLimiter,
    pub handlers: Arc<HandlerRegistry>,
    pub events: Option<EventSender>,
    pub lease_duration: Duration,
    pub poll_interval: Duration,
}

/// State for the worker actor.
pub struct WorkerActorState {
    args: WorkerArgs,
    /// Executions settled by this worker.
    processed: u64,
}

/// Renews a lease every half lease period until dropped.
struct RenewalTicker {
    task: JoinHandle<()>,
    lost: Arc<AtomicBool>,
}

impl RenewalTicker {
    fn spawn(store: JobStore, lease: Lease, lease_duration: Duration) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        let period = (lease_duration / 2).max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut lease = lease;
            loop {
                tokio::time::sleep(period).await;
                match store.renew_lease(&lease, lease_duration).await {
                    Ok(renewed) => lease = renewed,
                    Err(StoreError::LeaseLost(_)) => {
                        flag.store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to renew lease on job {}: {}", lease.job_id, e);
                    }
                }
            }
        });

        Self { task, lost }
    }

    /// Stop renewing; returns whether the lease was lost meanwhile.
    fn finish(self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

impl Drop for RenewalTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl WorkerActorState {
    fn emit(&self, event: JobEvent) {
        if let Some(ref tx) = self.args.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    /// Report a job the store dead-lettered while this worker polled.
    fn expired(&self, record: DeadLetterRecord) {
        let event = JobEvent::JobFailed {
            job_id: record.job.id,
            worker_id: self.args.worker_id.clone(),
            error: record.reason,
            attempts: record.job.attempts,
            retry_in_ms: None,
            timestamp: record.failed_at,
        };
        tracing::warn!("{}", event.description());
        self.emit(event);
    }

    /// Run one leased job to a settled state.
    async fn execute(&mut self, job: Job) {
        let Some(lease) = job.lease() else {
            tracing::warn!("Job {} was leased without lease details", job.id);
            return;
        };

        let ticker = RenewalTicker::spawn(
            self.args.store.clone(),
            lease.clone(),
            self.args.lease_duration,
        );
        self.args.limiter.acquire().await;

        let started = Instant::now();
        let outcome = match self.args.handlers.get(&job.job_type) {
            Some(handler) => handler.deliver(&job).await,
            None => DeliveryOutcome::Permanent(format!("No handler for job type: {}", job.job_type)),
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if ticker.finish() {
            tracing::debug!(
                "Worker {} lost the lease on job {} while running it",
                self.args.worker_id,
                job.id
            );
            return;
        }

        match self.settle(&job, &lease, outcome, duration_ms).await {
            Ok(event) => {
                self.processed += 1;
                if matches!(event, JobEvent::JobCompleted { .. }) {
                    tracing::info!("{}", event.description());
                } else {
                    tracing::warn!("{}", event.description());
                }
                self.emit(event);
            }
            Err(StoreError::LeaseLost(_)) => {
                tracing::debug!(
                    "Worker {} abandoned job {}: lease lost",
                    self.args.worker_id,
                    job.id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Worker {} could not settle job {}: {}",
                    self.args.worker_id,
                    job.id,
                    e
                );
            }
        }
    }

    async fn settle(
        &self,
        job: &Job,
        lease: &Lease,
        outcome: DeliveryOutcome,
        duration_ms: u64,
    ) -> Result<JobEvent, StoreError> {
        let store = &self.args.store;
        let failed = |error: String, retry_in_ms: Option<u64>| JobEvent::JobFailed {
            job_id: job.id,
            worker_id: self.args.worker_id.clone(),
            error,
            attempts: job.attempts,
            retry_in_ms,
            timestamp: store.clock().now(),
        };

        match outcome {
            DeliveryOutcome::Delivered => {
                store.ack(lease).await?;
                Ok(JobEvent::JobCompleted {
                    job_id: job.id,
                    worker_id: self.args.worker_id.clone(),
                    attempts: job.attempts,
                    duration_ms,
                    timestamp: store.clock().now(),
                })
            }
            DeliveryOutcome::Transient(reason) => match job.retry.next_delay(job.attempts) {
                Backoff::Retry(delay) => {
                    store.reschedule(lease, delay, &reason).await?;
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    Ok(failed(reason, Some(delay_ms)))
                }
                Backoff::Exhausted => {
                    store.fail(lease, &reason).await?;
                    Ok(failed(reason, None))
                }
            },
            DeliveryOutcome::Permanent(reason) => {
                store.fail(lease, &reason).await?;
                Ok(failed(reason, None))
            }
        }
    }
}

/// Worker actor that leases and executes jobs one at a time.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);
        Ok(WorkerActorState { args, processed: 0 })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        myself.send_message(WorkerMessage::Poll)?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                let polled = state
                    .args
                    .store
                    .poll(&state.args.worker_id, state.args.lease_duration)
                    .await;

                match polled {
                    Ok(LeasePoll { job, expired }) => {
                        for record in expired {
                            state.expired(record);
                        }
                        match job {
                            Some(job) => {
                                state.execute(job).await;
                                // Keep draining while work is available.
                                myself.send_message(WorkerMessage::Poll)?;
                            }
                            None => {
                                myself.send_after(state.args.poll_interval, || WorkerMessage::Poll);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Worker {} failed to poll: {}", state.args.worker_id, e);
                        myself.send_after(state.args.poll_interval, || WorkerMessage::Poll);
                    }
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Worker {} stopped after {} executions",
            state.args.worker_id,
            state.processed
        );
        Ok(())
    }
}
