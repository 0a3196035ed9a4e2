//! Delivery provider boundary.

use std::sync::Arc;

use actors::{DeliveryHandler, DeliveryOutcome, HandlerFuture};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use queue_core::Job;

use crate::message::{EmailMessage, SEND_JOB};

/// A mail provider client.
///
/// Implementations classify provider errors: throttling, timeouts and server
/// errors are `Transient`; rejected recipients and invalid requests are
/// `Permanent`.
pub trait MailTransport: Send + Sync + 'static {
    fn send(&self, from: &str, message: &EmailMessage) -> BoxFuture<'static, DeliveryOutcome>;
}

/// Transport that only logs; used when no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn send(&self, from: &str, message: &EmailMessage) -> BoxFuture<'static, DeliveryOutcome> {
        tracing::info!(
            "Email from {} to {}: {}",
            from,
            message.to,
            message.subject
        );
        async { DeliveryOutcome::Delivered }.boxed()
    }
}

/// Runs `send` jobs through a [`MailTransport`].
pub struct MailDeliveryHandler {
    transport: Arc<dyn MailTransport>,
    from: String,
}

impl MailDeliveryHandler {
    pub fn new(transport: Arc<dyn MailTransport>, from: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
        }
    }
}

impl DeliveryHandler for MailDeliveryHandler {
    fn job_type(&self) -> &str {
        SEND_JOB
    }

    fn deliver(&self, job: &Job) -> HandlerFuture {
        match serde_json::from_value::<EmailMessage>(job.payload.clone()) {
            Ok(message) => {
                let delivery = self.transport.send(&self.from, &message);
                let to = message.to;
                async move {
                    let outcome = delivery.await;
                    if outcome.is_delivered() {
                        tracing::info!("Email sent successfully to {}", to);
                    }
                    outcome
                }
                .boxed()
            }
            // Retrying cannot fix a payload that does not decode.
            Err(e) => {
                let reason = format!("Invalid mail payload: {}", e);
                async move { DeliveryOutcome::Permanent(reason) }.boxed()
            }
        }
    }
}
