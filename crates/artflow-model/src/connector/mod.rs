//! Connectors to hosted chat models.

mod config;
mod openai;

pub use config::{
    DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, OpenAiConfig, OpenAiConfigBuilder,
    OpenAiConfigBuilderError,
};
pub use openai::OpenAiChat;
