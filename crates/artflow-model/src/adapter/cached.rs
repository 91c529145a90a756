//! Caching wrapper for chat models.

use std::sync::Arc;

use jiff::Timestamp;
use serde_json::Value;

use crate::TRACING_TARGET;
use crate::cache::{ClearFilter, ResponseCache};
use crate::chat::{ChatHistory, ChatModel, ModelParams, merge_params};
use crate::error::Result;

/// A chat model that caches the responses of the model it wraps.
///
/// The system prompt and the chat history are part of the cache key, so
/// the same message in a different conversation is a separate entry. The
/// cache handle may be shared with other models.
#[derive(Clone)]
pub struct CachedChatModel {
    model: Arc<dyn ChatModel>,
    cache: Arc<ResponseCache>,
}

impl CachedChatModel {
    /// Wraps a model with the given cache.
    pub fn new(model: impl ChatModel + 'static, cache: Arc<ResponseCache>) -> Self {
        Self::from_arc(Arc::new(model), cache)
    }

    /// Wraps a shared model with the given cache.
    pub fn from_arc(model: Arc<dyn ChatModel>, cache: Arc<ResponseCache>) -> Self {
        Self { model, cache }
    }

    /// Returns the wrapped model.
    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    /// Returns the cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Evicts this model's entries created or accessed before the given
    /// times; with neither set, every entry of this model is evicted.
    pub async fn clear_cache(
        &self,
        created_before: Option<Timestamp>,
        accessed_before: Option<Timestamp>,
    ) -> usize {
        let filter = ClearFilter {
            model_id: Some(self.model_id().to_owned()),
            created_before,
            accessed_before,
        };
        self.cache.clear(&filter).await
    }

    fn cache_params(&self, history: Option<&ChatHistory>, params: &ModelParams) -> ModelParams {
        let mut merged = merge_params(self.model.model_params(), params);
        if let Some(system_prompt) = self.model.system_prompt() {
            merged.insert("_system_prompt".into(), Value::from(system_prompt));
        }
        for (i, message) in history.into_iter().flatten().enumerate() {
            merged.insert(
                format!("_history_{i}"),
                Value::from(format!("[{}]\n{}", message.role(), message.text())),
            );
        }
        merged
    }
}

#[async_trait::async_trait]
impl ChatModel for CachedChatModel {
    fn model_id(&self) -> &str {
        self.model.model_id()
    }

    fn system_prompt(&self) -> Option<&str> {
        self.model.system_prompt()
    }

    fn model_params(&self) -> ModelParams {
        self.model.model_params()
    }

    fn with_system_prompt(&self, system_prompt: &str) -> Arc<dyn ChatModel> {
        Arc::new(Self::from_arc(
            self.model.with_system_prompt(system_prompt),
            Arc::clone(&self.cache),
        ))
    }

    async fn get_response_with(
        &self,
        message: &str,
        history: Option<&ChatHistory>,
        params: &ModelParams,
    ) -> Result<Vec<String>> {
        let key_params = self.cache_params(history, params);
        if let Some(responses) = self.cache.get(self.model_id(), message, &key_params).await {
            return Ok(responses);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            model_id = self.model_id(),
            "Response cache miss"
        );

        let responses = self
            .model
            .get_response_with(message, history, params)
            .await?;
        self.cache
            .put(self.model_id(), message, &key_params, responses.clone())
            .await;
        Ok(responses)
    }
}

impl std::fmt::Debug for CachedChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedChatModel")
            .field("model_id", &self.model.model_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::mock::MockChatModel;

    fn cached(mock: &MockChatModel) -> CachedChatModel {
        CachedChatModel::new(mock.clone(), Arc::new(ResponseCache::in_memory()))
    }

    #[tokio::test]
    async fn repeated_requests_hit_the_cache() {
        let mock = MockChatModel::fixed(["pong"]);
        let model = cached(&mock);

        assert_eq!(model.get_response("ping", None).await.unwrap(), ["pong"]);
        assert_eq!(model.get_response("ping", None).await.unwrap(), ["pong"]);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn history_and_system_prompt_are_part_of_the_key() {
        let mock = MockChatModel::fixed(["pong"]);
        let model = cached(&mock);
        let history = ChatHistory::from_messages([ChatMessage::user("earlier")]);

        model.get_response("ping", None).await.unwrap();
        model.get_response("ping", Some(&history)).await.unwrap();
        model
            .with_system_prompt("be terse")
            .get_response("ping", None)
            .await
            .unwrap();

        assert_eq!(mock.calls(), 3);
        assert_eq!(model.cache().len().await, 3);
    }

    #[tokio::test]
    async fn clear_cache_evicts_this_model() {
        let mock = MockChatModel::fixed(["pong"]);
        let model = cached(&mock);
        model.get_response("ping", None).await.unwrap();

        assert_eq!(model.clear_cache(None, None).await, 1);
        model.get_response("ping", None).await.unwrap();
        assert_eq!(mock.calls(), 2);
    }
}
