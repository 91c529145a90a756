//! Convenient re-exports for common usage.

pub use crate::adapter::{CachedChatModel, HistorizedChatModel};
pub use crate::cache::ResponseCache;
pub use crate::chat::{ChatHistory, ChatMessage, ChatModel, ModelParams, Role};
pub use crate::error::{Error, Result};
pub use crate::json::parse_json_autofix;
pub use crate::multi_turn::{Conversation, MultiTurnConfig, multi_turn};
pub use crate::retry::{RetryPolicy, retry_with_backoff};
pub use crate::step::{chat_step, multi_turn_step};
pub use crate::template::TextTemplate;
