//! Process runtime: owns the store connection, the worker pool and the
//! producer. Created once at startup and torn down explicitly.

use std::sync::Arc;

use actors::{EventSender, HandlerRegistry, PoolError, ShutdownReport, WorkerPool};
use db::{DbConfig, DeadLetterStore, JobStore};
use queue_core::{Clock, DispatchConfig, SystemClock};

use crate::error::InitError;
use crate::producer::{Mailer, Producer};
use crate::templates::MailSettings;
use crate::transport::{MailDeliveryHandler, MailTransport};

/// Startup options for a [`Dispatcher`].
pub struct DispatcherBuilder {
    transport: Arc<dyn MailTransport>,
    config: DispatchConfig,
    database: DbConfig,
    settings: MailSettings,
    clock: Arc<dyn Clock>,
    events: Option<EventSender>,
    handlers: HandlerRegistry,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn database(mut self, database: DbConfig) -> Self {
        self.database = database;
        self
    }

    pub fn mail_settings(mut self, settings: MailSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Receive one [`JobEvent`](queue_core::JobEvent) per settled execution.
    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Extra handler for a non-mail job type. The `send` handler always
    /// wraps the configured transport.
    pub fn handler<H: actors::DeliveryHandler>(mut self, handler: H) -> Self {
        self.handlers.register(handler);
        self
    }

    pub async fn start(self) -> Result<Dispatcher, InitError> {
        self.config.validate()?;
        tracing::info!("Initializing mail dispatcher...");

        let db = db::init(&self.database).await?;
        let store = db::job_store(db, self.clock, &self.config);

        let mut handlers = self.handlers;
        handlers.register(MailDeliveryHandler::new(
            self.transport,
            self.settings.from.clone(),
        ));

        let pool = WorkerPool::start(store.clone(), handlers, self.events, &self.config).await?;
        let producer = Producer::new(store.clone(), self.config.retry_policy());
        let mailer = Mailer::new(producer, self.settings);

        tracing::info!("Mail dispatcher initialized");
        Ok(Dispatcher {
            store,
            pool,
            mailer,
            config: self.config,
        })
    }
}

/// A running dispatcher.
pub struct Dispatcher {
    store: JobStore,
    pool: WorkerPool,
    mailer: Mailer,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn builder(transport: Arc<dyn MailTransport>) -> DispatcherBuilder {
        DispatcherBuilder {
            transport,
            config: DispatchConfig::default(),
            database: DbConfig::memory(),
            settings: MailSettings::default(),
            clock: Arc::new(SystemClock),
            events: None,
            handlers: HandlerRegistry::new(),
        }
    }

    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn dead_letters(&self) -> &DeadLetterStore {
        self.store.dead_letters()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub async fn workers(&self) -> Result<Vec<String>, PoolError> {
        self.pool.workers().await
    }

    /// Stop the workers within the configured grace period.
    pub async fn shutdown(self) -> Result<ShutdownReport, PoolError> {
        let report = self.pool.shutdown(self.config.shutdown_grace()).await?;
        tracing::info!(
            "Mail dispatcher stopped ({} workers stopped, {} killed)",
            report.stopped,
            report.killed
        );
        Ok(report)
    }
}
