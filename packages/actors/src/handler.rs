//! Delivery handler trait and registry.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use queue_core::Job;

/// How one execution of a job ended.
///
/// Handlers report failures as values; the worker decides between retry and
/// dead-letter from the variant alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Worth retrying after backoff (timeouts, throttling, 5xx).
    Transient(String),
    /// Retrying cannot help (rejected recipient, malformed payload).
    Permanent(String),
}

impl DeliveryOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Future type for async delivery handlers.
pub type HandlerFuture = BoxFuture<'static, DeliveryOutcome>;

/// Trait for delivery handlers.
///
/// Implement this trait to define how jobs of a specific type are delivered.
pub trait DeliveryHandler: Send + Sync + 'static {
    /// The job type this handler processes.
    fn job_type(&self) -> &str;

    /// Run one execution of `job`.
    fn deliver(&self, job: &Job) -> HandlerFuture;
}

/// Maps job types to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn DeliveryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for the same job type.
    pub fn register<H: DeliveryHandler>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn DeliveryHandler>) {
        let job_type = handler.job_type().to_string();
        self.handlers.insert(job_type, handler);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<H: DeliveryHandler>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn DeliveryHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

/// A closure-based delivery handler.
pub struct FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    job_type: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(job_type: impl Into<String>, handler: F) -> Self {
        Self {
            job_type: job_type.into(),
            handler,
        }
    }
}

impl<F> DeliveryHandler for FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn deliver(&self, job: &Job) -> HandlerFuture {
        (self.handler)(job)
    }
}
