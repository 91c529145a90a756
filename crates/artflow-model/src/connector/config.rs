//! Configuration of the OpenAI-compatible connector.

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default environment variable holding the API key.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration of [`OpenAiChat`](super::OpenAiChat).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct OpenAiConfig {
    /// Base URL of the API, without the `/chat/completions` suffix.
    #[cfg_attr(
        feature = "config",
        arg(long = "openai-base-url", env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)
    )]
    #[builder(default = "DEFAULT_BASE_URL.to_owned()")]
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable the API key is read from.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "openai-api-key-env",
            env = "OPENAI_API_KEY_ENV",
            default_value = DEFAULT_API_KEY_ENV
        )
    )]
    #[builder(default = "DEFAULT_API_KEY_ENV.to_owned()")]
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "openai-timeout-secs",
            env = "OPENAI_TIMEOUT_SECS",
            default_value_t = DEFAULT_TIMEOUT_SECS
        )
    )]
    #[builder(default = "DEFAULT_TIMEOUT_SECS")]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Backoff applied to rate-limited requests.
    #[cfg_attr(feature = "config", command(flatten))]
    #[builder(default)]
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_owned()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl OpenAiConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.base_url.as_ref().is_some_and(|url| url.trim().is_empty()) {
            return Err("base_url must not be empty".into());
        }
        if self.api_key_env.as_ref().is_some_and(String::is_empty) {
            return Err("api_key_env must not be empty".into());
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than 0".into());
        }
        Ok(())
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl OpenAiConfig {
    /// Returns a builder for the configuration.
    pub fn builder() -> OpenAiConfigBuilder {
        OpenAiConfigBuilder::default()
    }

    /// Returns the URL of the chat completions endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
