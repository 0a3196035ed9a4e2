//! Producer API: durable enqueue of send requests.

use db::{JobStore, StoreError};
use queue_core::{JobId, RetryPolicy};

use crate::error::SubmitError;
use crate::message::{EmailMessage, MessageKind, SEND_JOB, TemplateArgs};
use crate::templates::{self, MailSettings};

/// Enqueues raw jobs with a default retry policy.
///
/// Returns as soon as the job is durable; never waits on delivery capacity.
#[derive(Clone)]
pub struct Producer {
    store: JobStore,
    policy: RetryPolicy,
}

impl Producer {
    pub fn new(store: JobStore, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
    ) -> Result<JobId, StoreError> {
        self.enqueue_with(job_type, payload, self.policy).await
    }

    pub async fn enqueue_with(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        policy: RetryPolicy,
    ) -> Result<JobId, StoreError> {
        let id = self.store.enqueue(job_type, payload, policy).await?;
        tracing::debug!("Enqueued {} job {}", job_type, id);
        Ok(id)
    }
}

/// Mail-facing producer: renders templates and enqueues `send` jobs.
#[derive(Clone)]
pub struct Mailer {
    producer: Producer,
    settings: MailSettings,
}

impl Mailer {
    pub fn new(producer: Producer, settings: MailSettings) -> Self {
        Self { producer, settings }
    }

    /// Render `kind` for `recipient` and enqueue it for delivery.
    pub async fn submit(
        &self,
        kind: MessageKind,
        recipient: &str,
        args: &TemplateArgs,
    ) -> Result<JobId, SubmitError> {
        let message = templates::render(kind, recipient, args, &self.settings)?;
        self.send_email(message).await
    }

    /// Enqueue an already rendered message.
    pub async fn send_email(&self, message: EmailMessage) -> Result<JobId, SubmitError> {
        let payload = serde_json::to_value(&message)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let id = self.producer.enqueue(SEND_JOB, payload).await?;
        tracing::info!("Queued \"{}\" to {} as job {}", message.subject, message.to, id);
        Ok(id)
    }

    pub async fn send_verification(&self, to: &str, code: &str) -> Result<JobId, SubmitError> {
        self.send_email(templates::verification(to, code)).await
    }

    pub async fn send_password_reset(&self, to: &str, token: &str) -> Result<JobId, SubmitError> {
        self.send_email(templates::password_reset(
            to,
            token,
            &self.settings.frontend_url,
        ))
        .await
    }
}
