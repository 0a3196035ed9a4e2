#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::DeliveryOutcome;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mailer::{EmailMessage, JobEvent, MailTransport};
use queue_core::{DispatchConfig, RateLimitConfig};
use tokio::sync::mpsc;

/// Transport that records every send and replays scripted outcomes,
/// delivering once the script runs out.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, EmailMessage)>>,
    script: Mutex<VecDeque<DeliveryOutcome>>,
}

impl RecordingTransport {
    pub fn scripted(outcomes: impl IntoIterator<Item = DeliveryOutcome>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(outcomes.into_iter().collect()),
        })
    }

    pub fn delivering() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(String, EmailMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailTransport for RecordingTransport {
    fn send(&self, from: &str, message: &EmailMessage) -> BoxFuture<'static, DeliveryOutcome> {
        self.sent
            .lock()
            .unwrap()
            .push((from.to_string(), message.clone()));
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered);
        async move { outcome }.boxed()
    }
}

pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        rate_limit: RateLimitConfig {
            max: 1000,
            window_ms: 1000,
        },
        poll_interval_ms: 10,
        remove_on_complete: false,
        shutdown_grace_ms: 1000,
        ..DispatchConfig::default()
    }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<JobEvent>) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for a job event")
        .expect("event channel closed")
}
