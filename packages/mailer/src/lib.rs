//! Transactional mail dispatch.
//!
//! Callers submit verification and password-reset mails through [`Mailer`];
//! submission returns once the job is durable and delivery happens on the
//! worker pool, rate limited and retried with backoff.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailer::{Dispatcher, LogTransport, MailSettings};
//!
//! let dispatcher = Dispatcher::builder(Arc::new(LogTransport))
//!     .config(queue_core::DispatchConfig::load(None)?)
//!     .mail_settings(MailSettings::from_env())
//!     .start()
//!     .await?;
//! dispatcher.mailer().send_verification("a@example.com", "123456").await?;
//! dispatcher.shutdown().await?;
//! ```

mod error;
mod message;
mod producer;
mod runtime;
mod templates;
mod transport;
pub mod telemetry;

pub use error::{InitError, SubmitError};
pub use message::{EmailMessage, MessageKind, SEND_JOB, TemplateArgs};
pub use producer::{Mailer, Producer};
pub use runtime::{Dispatcher, DispatcherBuilder};
pub use templates::{MailSettings, password_reset, render, verification};
pub use transport::{LogTransport, MailDeliveryHandler, MailTransport};

// Re-export core types for convenience
pub use queue_core::{DeadLetterRecord, DispatchConfig, JobEvent, JobId};
