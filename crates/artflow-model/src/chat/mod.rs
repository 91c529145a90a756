//! Chat messages, histories and the [`ChatModel`] trait.

mod history;
mod message;
mod model;

pub use history::ChatHistory;
pub use message::{ChatMessage, Role};
pub(crate) use model::merge_params;
pub use model::{ChatModel, ModelParams};
