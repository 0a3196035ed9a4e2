//! Outgoing mail and the kinds of mail the service sends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Job type of every mail delivery job.
pub const SEND_JOB: &str = "send";

/// A rendered message, stored as the payload of a `send` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Template selector for [`Mailer::submit`](crate::Mailer::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Needs a `code` argument.
    Verification,
    /// Needs a `token` argument.
    PasswordReset,
}

/// Named template arguments.
pub type TemplateArgs = BTreeMap<String, String>;
