mod common;

use std::sync::Arc;
use std::time::Duration;

use actors::DeliveryOutcome;
use common::{RecordingTransport, next_event, test_config};
use mailer::{Dispatcher, InitError, JobEvent, MailSettings, MessageKind, SubmitError, TemplateArgs};
use queue_core::{DispatchConfig, JobStatus, ManualClock};
use tokio::sync::mpsc;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn settings() -> MailSettings {
    MailSettings {
        from: "Auth App <auth@example.com>".to_string(),
        frontend_url: "https://app.example.com".to_string(),
    }
}

#[tokio::test]
async fn verification_mail_is_delivered_with_configured_sender() -> TestResult {
    let transport = RecordingTransport::delivering();
    let (tx, mut events) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(transport.clone())
        .config(test_config())
        .mail_settings(settings())
        .events(tx)
        .start()
        .await?;

    let id = dispatcher
        .mailer()
        .send_verification("a@example.com", "482913")
        .await?;

    let event = next_event(&mut events).await;
    assert!(matches!(event, JobEvent::JobCompleted { job_id, attempts: 1, .. } if job_id == id));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Auth App <auth@example.com>");
    assert_eq!(sent[0].1.to, "a@example.com");
    assert_eq!(sent[0].1.subject, "Verify your email");
    assert!(sent[0].1.html.contains("482913"));

    let job = dispatcher.store().get(id).await?.expect("retained");
    assert_eq!(job.status, JobStatus::Completed);

    dispatcher.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn submit_renders_password_reset_link() -> TestResult {
    let transport = RecordingTransport::delivering();
    let (tx, mut events) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(transport.clone())
        .config(test_config())
        .mail_settings(settings())
        .events(tx)
        .start()
        .await?;

    let mut args = TemplateArgs::new();
    args.insert("token".to_string(), "t0k3n".to_string());
    dispatcher
        .mailer()
        .submit(MessageKind::PasswordReset, "b@example.com", &args)
        .await?;
    next_event(&mut events).await;

    let sent = transport.sent();
    assert_eq!(sent[0].1.subject, "Reset your password");
    assert!(
        sent[0]
            .1
            .html
            .contains("https://app.example.com/reset-password?token=t0k3n")
    );

    dispatcher.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn missing_template_argument_enqueues_nothing() -> TestResult {
    let dispatcher = Dispatcher::builder(RecordingTransport::delivering())
        .config(test_config())
        .start()
        .await?;

    let result = dispatcher
        .mailer()
        .submit(MessageKind::Verification, "a@example.com", &TemplateArgs::new())
        .await;
    assert!(matches!(result, Err(SubmitError::MissingArgument("code"))));
    assert!(dispatcher.store().count_by_status().await?.is_empty());

    dispatcher.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn transient_then_delivered_mail_retries_with_backoff() -> TestResult {
    let transport =
        RecordingTransport::scripted([DeliveryOutcome::transient("429 rate limited")]);
    let clock = ManualClock::new();
    let (tx, mut events) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(transport.clone())
        .config(test_config())
        .clock(Arc::new(clock.clone()))
        .events(tx)
        .start()
        .await?;

    let id = dispatcher
        .mailer()
        .send_verification("a@example.com", "1")
        .await?;

    match next_event(&mut events).await {
        JobEvent::JobFailed {
            retry_in_ms: Some(delay),
            error,
            ..
        } => {
            assert_eq!(delay, 5000);
            assert_eq!(error, "429 rate limited");
            clock.advance(Duration::from_millis(delay));
        }
        other => panic!("unexpected event {:?}", other),
    }
    let event = next_event(&mut events).await;
    assert!(matches!(event, JobEvent::JobCompleted { attempts: 2, .. }));
    assert_eq!(event.job_id(), id);
    assert_eq!(transport.sent().len(), 2);
    assert_eq!(dispatcher.dead_letters().count().await?, 0);

    dispatcher.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn rejected_mail_lands_in_dead_letters() -> TestResult {
    let transport =
        RecordingTransport::scripted([DeliveryOutcome::permanent("422 invalid recipient")]);
    let (tx, mut events) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(transport)
        .config(test_config())
        .events(tx)
        .start()
        .await?;

    let id = dispatcher
        .mailer()
        .send_password_reset("bad@example", "t")
        .await?;
    let event = next_event(&mut events).await;
    assert!(event.is_terminal());

    let letters = dispatcher.dead_letters().list(10, 0).await?;
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].job.id, id);
    assert_eq!(letters[0].reason, "422 invalid recipient");
    assert_eq!(letters[0].job.payload["to"], "bad@example");

    dispatcher.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_config_fails_startup() {
    let result = Dispatcher::builder(RecordingTransport::delivering())
        .config(DispatchConfig {
            concurrency: 0,
            ..DispatchConfig::default()
        })
        .start()
        .await;
    assert!(matches!(result, Err(InitError::Config(_))));
}

#[tokio::test]
async fn pool_runs_configured_number_of_workers() -> TestResult {
    let dispatcher = Dispatcher::builder(RecordingTransport::delivering())
        .config(DispatchConfig {
            concurrency: 4,
            ..test_config()
        })
        .start()
        .await?;

    assert_eq!(dispatcher.workers().await?.len(), 4);
    let report = dispatcher.shutdown().await?;
    assert_eq!(report.stopped, 4);
    assert_eq!(report.killed, 0);
    Ok(())
}
