#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod adapter;
pub mod cache;
pub mod chat;
pub mod connector;
mod error;
pub mod json;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;
pub mod multi_turn;
pub mod retry;
pub mod step;
pub mod template;

#[doc(hidden)]
pub mod prelude;

pub use adapter::{CachedChatModel, HistorizedChatModel};
pub use cache::ResponseCache;
pub use chat::{ChatHistory, ChatMessage, ChatModel, ModelParams, Role};
pub use error::{Error, Result};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use template::TextTemplate;

/// Tracing target for model operations.
pub const TRACING_TARGET: &str = "artflow_model";
