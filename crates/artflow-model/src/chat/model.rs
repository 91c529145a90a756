//! The chat model abstraction.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::ChatHistory;
use crate::error::Result;

/// Additional parameters passed to a model, such as `temperature`.
pub type ModelParams = Map<String, Value>;

/// A model that responds to a user message, optionally in the context of a
/// chat history.
///
/// Implementations are shared across concurrent flow branches and must be
/// safe for concurrent use.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the identifier of the underlying model.
    fn model_id(&self) -> &str;

    /// Returns the system prompt, if any.
    fn system_prompt(&self) -> Option<&str>;

    /// Returns the default parameters sent with every request.
    fn model_params(&self) -> ModelParams {
        ModelParams::new()
    }

    /// Returns a copy of this model using the given system prompt.
    fn with_system_prompt(&self, system_prompt: &str) -> Arc<dyn ChatModel>;

    /// Gets one or more alternative responses to a user message.
    ///
    /// `params` override the model's default parameters for this call.
    async fn get_response_with(
        &self,
        message: &str,
        history: Option<&ChatHistory>,
        params: &ModelParams,
    ) -> Result<Vec<String>>;

    /// Gets one or more alternative responses using the default parameters.
    async fn get_response(
        &self,
        message: &str,
        history: Option<&ChatHistory>,
    ) -> Result<Vec<String>> {
        self.get_response_with(message, history, &ModelParams::new())
            .await
    }
}

/// Merges call parameters over the model defaults.
pub(crate) fn merge_params(defaults: ModelParams, overrides: &ModelParams) -> ModelParams {
    let mut merged = defaults;
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
