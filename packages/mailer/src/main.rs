//! Mail dispatcher process.
//!
//! Reads `DISPATCH_CONFIG` (a JSON file) and `DISPATCH_*` overrides, then
//! drains the queue until interrupted.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use db::DbConfig;
use mailer::{Dispatcher, LogTransport, MailSettings};
use queue_core::DispatchConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    mailer::telemetry::init();

    let path = std::env::var_os("DISPATCH_CONFIG").map(PathBuf::from);
    let config = DispatchConfig::load(path.as_deref())?;

    let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let dispatcher = Dispatcher::builder(Arc::new(LogTransport))
        .config(config)
        .database(DbConfig::from_env())
        .mail_settings(MailSettings::from_env())
        .events(tx)
        .start()
        .await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!("{}", event.description());
        }
    });

    tokio::signal::ctrl_c().await?;
    dispatcher.shutdown().await?;
    Ok(())
}
