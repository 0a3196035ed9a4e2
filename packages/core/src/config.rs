//! Dispatcher configuration.
//!
//! Options are read from a JSON document (camelCase keys, every key optional)
//! and may then be overridden by `DISPATCH_*` environment variables. Nested
//! keys are separated by a double underscore, e.g.
//! `DISPATCH_RATE_LIMIT__WINDOW_MS` sets `rateLimit.windowMs`.

use std::path::Path;
use std::time::Duration;

use ::config::builder::DefaultState;
use ::config::{Case, Config, ConfigBuilder, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BackoffPolicy, RetentionPolicy, RetryPolicy};

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "DISPATCH";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Rate limit across all workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Handler invocations allowed per window.
    pub max: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max: 2,
            window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5000,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeadLetterConfig {
    pub max_count: usize,
    pub max_age_seconds: u64,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_count: 100,
            max_age_seconds: 86_400,
        }
    }
}

/// Top-level dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Number of concurrent workers.
    pub concurrency: u32,
    pub rate_limit: RateLimitConfig,
    pub lease_duration_ms: u64,
    pub backoff: BackoffConfig,
    /// Executions per job, including the first.
    pub max_attempts: u32,
    pub dead_letter: DeadLetterConfig,
    /// Idle wait between polls when no job is eligible.
    pub poll_interval_ms: u64,
    /// How long shutdown waits for in-flight executions.
    pub shutdown_grace_ms: u64,
    /// Delete completed jobs instead of keeping them as `completed`.
    pub remove_on_complete: bool,
    /// Period of the dead-letter eviction sweep.
    pub housekeeping_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            rate_limit: RateLimitConfig::default(),
            lease_duration_ms: 30_000,
            backoff: BackoffConfig::default(),
            max_attempts: 3,
            dead_letter: DeadLetterConfig::default(),
            poll_interval_ms: 500,
            shutdown_grace_ms: 10_000,
            remove_on_complete: true,
            housekeeping_interval_ms: 60_000,
        }
    }
}

impl DispatchConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(json, FileFormat::Json)))
    }

    /// Load the JSON file at `path`, when given, and layer the process
    /// environment over it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading variables from `vars` instead of
    /// the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        vars: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Json));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .convert_case(Case::Camel)
                .try_parsing(true)
                .source(vars),
        );
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the worker pool cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.concurrency == 0, "concurrency must be at least 1"),
            (self.max_attempts == 0, "maxAttempts must be at least 1"),
            (self.rate_limit.max == 0, "rateLimit.max must be at least 1"),
            (self.rate_limit.window_ms == 0, "rateLimit.windowMs must be positive"),
            (self.lease_duration_ms == 0, "leaseDurationMs must be positive"),
            (self.poll_interval_ms == 0, "pollIntervalMs must be positive"),
            (self.dead_letter.max_count == 0, "deadLetter.maxCount must be at least 1"),
            (
                self.housekeeping_interval_ms == 0,
                "housekeepingIntervalMs must be positive",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid((*message).to_string())),
            None => Ok(()),
        }
    }

    /// Default retry policy applied to new jobs.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            BackoffPolicy::exponential(Duration::from_millis(self.backoff.base_delay_ms))
                .with_jitter(self.backoff.jitter),
        )
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_count: self.dead_letter.max_count,
            max_age: Duration::from_secs(self.dead_letter.max_age_seconds),
        }
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit.window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }
}
