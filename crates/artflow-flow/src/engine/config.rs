//! Run configuration.

#[cfg(feature = "config")]
use clap::{Args, ValueEnum};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio::sync::Semaphore;

use crate::error::{FlowError, FlowResult};

/// Default maximum number of step calls in flight at once.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 64;

/// Default maximum number of products taken from an unbounded stream.
pub const DEFAULT_UNBOUNDED_LIMIT: usize = 1000;

/// What happens to a run when a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumString)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Failed lineages are recorded in the result; other records continue.
    #[default]
    Isolate,
    /// The run fails with the first error and in-flight work is cancelled.
    Abort,
}

/// Configuration for a [`Runner`](super::Runner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RunConfig {
    /// Handling of per-record failures.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "flow-failure-policy",
            env = "FLOW_FAILURE_POLICY",
            value_enum,
            default_value_t = FailurePolicy::Isolate
        )
    )]
    #[builder(default)]
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Maximum number of step calls in flight at once, across all records.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "flow-max-concurrent-calls",
            env = "FLOW_MAX_CONCURRENT_CALLS",
            default_value_t = DEFAULT_MAX_CONCURRENT_CALLS
        )
    )]
    #[builder(default = "DEFAULT_MAX_CONCURRENT_CALLS")]
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Maximum number of products taken from an unbounded stream.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "flow-unbounded-limit",
            env = "FLOW_UNBOUNDED_LIMIT",
            default_value_t = DEFAULT_UNBOUNDED_LIMIT
        )
    )]
    #[builder(default = "DEFAULT_UNBOUNDED_LIMIT")]
    #[serde(default = "default_unbounded_limit")]
    pub unbounded_limit: usize,
}

fn default_max_concurrent_calls() -> usize {
    DEFAULT_MAX_CONCURRENT_CALLS
}

fn default_unbounded_limit() -> usize {
    DEFAULT_UNBOUNDED_LIMIT
}

impl RunConfig {
    /// Returns a builder for the configuration.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Checks the limits of a configuration that did not come from the
    /// builder, e.g. one deserialized or parsed from the environment.
    pub fn validate(&self) -> FlowResult<()> {
        check_limits(Some(self.max_concurrent_calls), Some(self.unbounded_limit))
            .map_err(FlowError::config)
    }
}

impl RunConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check_limits(self.max_concurrent_calls, self.unbounded_limit)
    }
}

fn check_limits(
    max_concurrent_calls: Option<usize>,
    unbounded_limit: Option<usize>,
) -> Result<(), String> {
    if max_concurrent_calls.is_some_and(|calls| !(1..=Semaphore::MAX_PERMITS).contains(&calls)) {
        return Err(format!(
            "max_concurrent_calls must be between 1 and {}",
            Semaphore::MAX_PERMITS
        ));
    }
    if unbounded_limit == Some(0) {
        return Err("unbounded_limit must be at least 1".into());
    }
    Ok(())
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Isolate,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            unbounded_limit: DEFAULT_UNBOUNDED_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = RunConfig::builder()
            .failure_policy(FailurePolicy::Abort)
            .build()
            .unwrap();

        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.max_concurrent_calls, DEFAULT_MAX_CONCURRENT_CALLS);
        assert_eq!(config.unbounded_limit, DEFAULT_UNBOUNDED_LIMIT);
    }

    #[test]
    fn builder_rejects_zero_limits() {
        assert!(RunConfig::builder().max_concurrent_calls(0usize).build().is_err());
        assert!(RunConfig::builder().unbounded_limit(0usize).build().is_err());
    }

    #[test]
    fn deserialized_limits_are_checked() {
        let config: RunConfig = serde_json::from_str(r#"{"max_concurrent_calls":0}"#).unwrap();
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));

        let config: RunConfig = serde_json::from_str(r#"{"unbounded_limit":0}"#).unwrap();
        assert!(config.validate().is_err());

        let config = RunConfig {
            max_concurrent_calls: Semaphore::MAX_PERMITS + 1,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn deserializes_partial_config() {
        let config: RunConfig = serde_json::from_str(r#"{"failure_policy":"abort"}"#).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.unbounded_limit, DEFAULT_UNBOUNDED_LIMIT);
        assert_eq!("isolate".parse::<FailurePolicy>().unwrap(), FailurePolicy::Isolate);
    }
}
