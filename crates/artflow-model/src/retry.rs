//! Retrying rate-limited requests with exponential backoff.

use std::future::Future;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tracing target for retry operations.
const TRACING_TARGET: &str = "artflow_model::retry";

/// Default initial delay between attempts, in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Default growth factor of the delay.
pub const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

/// Default number of attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Upper bound of the delay between two attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(600);

/// Exponential backoff applied to rate-limited requests.
///
/// Before each wait the delay is multiplied by
/// `exponential_base * (1 + r)`, where `r` is uniform in `[0, 1)` when
/// jitter is enabled and `0` otherwise. The delay never exceeds
/// [`MAX_DELAY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RetryPolicy {
    /// Initial delay in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "retry-initial-delay-ms",
            env = "RETRY_INITIAL_DELAY_MS",
            default_value_t = DEFAULT_INITIAL_DELAY_MS
        )
    )]
    #[builder(default = "DEFAULT_INITIAL_DELAY_MS")]
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Growth factor of the delay.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "retry-exponential-base",
            env = "RETRY_EXPONENTIAL_BASE",
            default_value_t = DEFAULT_EXPONENTIAL_BASE
        )
    )]
    #[builder(default = "DEFAULT_EXPONENTIAL_BASE")]
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Whether to randomize the delay.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "retry-jitter",
            env = "RETRY_JITTER",
            default_value_t = true,
            action = clap::ArgAction::Set
        )
    )]
    #[builder(default = "true")]
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Maximum number of attempts.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "retry-max-retries",
            env = "RETRY_MAX_RETRIES",
            default_value_t = DEFAULT_MAX_RETRIES
        )
    )]
    #[builder(default = "DEFAULT_MAX_RETRIES")]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}

fn default_exponential_base() -> f64 {
    DEFAULT_EXPONENTIAL_BASE
}

fn default_jitter() -> bool {
    true
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl RetryPolicyBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        check_policy(self.max_retries, self.exponential_base)
    }
}

fn check_policy(
    max_retries: Option<u32>,
    exponential_base: Option<f64>,
) -> std::result::Result<(), String> {
    if max_retries == Some(0) {
        return Err("max_retries must be at least 1".into());
    }
    if exponential_base.is_some_and(|base| !(base.is_finite() && base >= 1.0)) {
        return Err("exponential_base must be a finite number of at least 1.0".into());
    }
    Ok(())
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
            jitter: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Returns a builder for the policy.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Returns the initial delay.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Checks a policy that did not come from the builder, e.g. one
    /// deserialized or parsed from the environment.
    pub fn validate(&self) -> Result<()> {
        check_policy(Some(self.max_retries), Some(self.exponential_base)).map_err(Error::config)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let jitter = if self.jitter { rand::random::<f64>() } else { 0.0 };
        let factor = self.exponential_base * (1.0 + jitter);
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .map_or(MAX_DELAY, |next| next.min(MAX_DELAY))
    }
}

/// Runs `operation`, retrying it with exponential backoff while it fails
/// with a rate limit error.
///
/// Other errors are returned immediately. After `max_retries` rate-limited
/// attempts the last error is wrapped in [`Error::RetriesExhausted`]. An
/// invalid policy fails with [`Error::Config`] before the first attempt.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy.validate()?;
    let mut delay = policy.initial_delay();
    let mut last_error = None;

    for attempt in 1..=policy.max_retries {
        match operation().await {
            Err(error) if error.is_rate_limit() => {
                delay = policy.next_delay(delay);
                tracing::warn!(
                    target: TRACING_TARGET,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limit exceeded, retrying"
                );
                tokio::time::sleep(delay).await;
                last_error = Some(error);
            }
            result => return result,
        }
    }

    let source = last_error.unwrap_or_else(|| Error::rate_limit("no attempt was made"));
    Err(Error::RetriesExhausted {
        attempts: policy.max_retries,
        source: Box::new(source),
    })
}
