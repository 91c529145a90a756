//! Chat model wrapper that keeps its own conversation history.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chat::{ChatHistory, ChatMessage, ChatModel, ModelParams};
use crate::error::{Error, Result};

/// A chat model that maintains a chat history across calls.
///
/// Each call sends the accumulated history to the wrapped model, then
/// appends the user message and the first response. Calls on the same
/// instance are serialized.
pub struct HistorizedChatModel {
    model: Arc<dyn ChatModel>,
    history: Mutex<ChatHistory>,
}

impl HistorizedChatModel {
    /// Wraps a model with an unbounded history.
    pub fn new(model: impl ChatModel + 'static) -> Self {
        Self::from_arc(Arc::new(model))
    }

    /// Wraps a shared model with an unbounded history.
    pub fn from_arc(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            history: Mutex::new(ChatHistory::new()),
        }
    }

    /// Wraps a shared model, keeping at most `max_history` messages.
    pub fn with_max_history(model: Arc<dyn ChatModel>, max_history: usize) -> Result<Self> {
        Ok(Self {
            model,
            history: Mutex::new(ChatHistory::with_max_length(max_history)?),
        })
    }

    /// Returns a snapshot of the history.
    pub async fn history(&self) -> ChatHistory {
        self.history.lock().await.clone()
    }

    /// Returns the history length limit, if any.
    pub async fn max_history(&self) -> Option<usize> {
        self.history.lock().await.max_length()
    }
}

#[async_trait::async_trait]
impl ChatModel for HistorizedChatModel {
    fn model_id(&self) -> &str {
        self.model.model_id()
    }

    fn system_prompt(&self) -> Option<&str> {
        self.model.system_prompt()
    }

    fn model_params(&self) -> ModelParams {
        self.model.model_params()
    }

    /// Returns a historized copy of the wrapped model with an empty history.
    fn with_system_prompt(&self, system_prompt: &str) -> Arc<dyn ChatModel> {
        Arc::new(Self::from_arc(self.model.with_system_prompt(system_prompt)))
    }

    async fn get_response_with(
        &self,
        message: &str,
        history: Option<&ChatHistory>,
        params: &ModelParams,
    ) -> Result<Vec<String>> {
        if history.is_some() {
            return Err(Error::invalid_argument(
                "cannot provide a history to a historized chat model",
            ));
        }

        let mut own_history = self.history.lock().await;
        let responses = self
            .model
            .get_response_with(message, Some(&*own_history), params)
            .await?;

        own_history.push(ChatMessage::user(message));
        if let Some(first) = responses.first() {
            own_history.push(ChatMessage::assistant(first.clone()));
        }
        Ok(responses)
    }
}

impl std::fmt::Debug for HistorizedChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistorizedChatModel")
            .field("model_id", &self.model.model_id())
            .finish_non_exhaustive()
    }
}
