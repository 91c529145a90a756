//! Error types for artflow-model.

use std::fmt;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to chat models.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider rejected the request because of a rate limit.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Every attempt was rate limited.
    #[error("rate limit error after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last rate limit error.
        #[source]
        source: Box<Error>,
    },

    /// The provider returned an error response.
    #[error("provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Invalid configuration, such as a missing API key.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid argument passed to a model or utility.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed or incomplete text template.
    #[error("template error: {0}")]
    Template(String),

    /// JSON returned by a model could not be repaired.
    #[error("json error: {0}")]
    Json(String),

    /// Response cache error.
    #[error("cache error: {0}")]
    Cache(String),

    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a rate limit error.
    pub fn rate_limit(message: impl fmt::Display) -> Self {
        Self::RateLimit(message.to_string())
    }

    /// Creates a provider error.
    pub fn provider(provider: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl fmt::Display) -> Self {
        Self::Config(message.to_string())
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl fmt::Display) -> Self {
        Self::InvalidArgument(message.to_string())
    }

    /// Creates a template error.
    pub fn template(message: impl fmt::Display) -> Self {
        Self::Template(message.to_string())
    }

    /// Creates a JSON error.
    pub fn json(message: impl fmt::Display) -> Self {
        Self::Json(message.to_string())
    }

    /// Creates a cache error.
    pub fn cache(message: impl fmt::Display) -> Self {
        Self::Cache(message.to_string())
    }

    /// Returns true if the request may succeed when retried later.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_are_retryable() {
        assert!(Error::rate_limit("slow down").is_rate_limit());
        assert!(!Error::provider("openai", "bad request").is_rate_limit());
        assert!(!Error::config("missing key").is_rate_limit());
    }

    #[test]
    fn exhausted_retries_keep_last_error() {
        let error = Error::RetriesExhausted {
            attempts: 5,
            source: Box::new(Error::rate_limit("429")),
        };
        assert_eq!(error.to_string(), "rate limit error after 5 attempts");
        assert!(std::error::Error::source(&error).is_some());
    }
}
