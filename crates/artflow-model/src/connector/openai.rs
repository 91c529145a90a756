//! OpenAI-compatible chat completions connector.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::OpenAiConfig;
use crate::chat::{ChatHistory, ChatModel, ModelParams, merge_params};
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;

/// Tracing target for OpenAI connector operations.
const TRACING_TARGET: &str = "artflow_model::openai";

/// Provider name used in errors.
const PROVIDER: &str = "openai";

/// Inner client shared by all copies of a connector.
struct OpenAiInner {
    http: Client,
    config: OpenAiConfig,
    api_key: String,
}

impl std::fmt::Debug for OpenAiInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiInner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A chat model served by an OpenAI-compatible `/chat/completions` endpoint.
///
/// Copies made by [`with_system_prompt`](ChatModel::with_system_prompt)
/// share the HTTP client. Rate-limited requests are retried according to
/// the configured [`RetryPolicy`](crate::RetryPolicy).
///
/// # Examples
///
/// ```rust,ignore
/// use artflow_model::connector::{OpenAiChat, OpenAiConfig};
///
/// let model = OpenAiChat::new("gpt-4o-mini", OpenAiConfig::default())?
///     .with_param("temperature", 0.0);
/// let responses = model.get_response("Hello!", None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    inner: Arc<OpenAiInner>,
    model_id: String,
    system_prompt: Option<String>,
    params: ModelParams,
}

impl OpenAiChat {
    /// Creates a connector, reading the API key from the configured
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is not set or the HTTP
    /// client cannot be created.
    pub fn new(model_id: impl Into<String>, config: OpenAiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::config(format!(
                "environment variable '{}' with the API key is not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(model_id, api_key, config)
    }

    /// Creates a connector using the given API key.
    pub fn with_api_key(
        model_id: impl Into<String>,
        api_key: impl Into<String>,
        config: OpenAiConfig,
    ) -> Result<Self> {
        let model_id = model_id.into();
        tracing::debug!(
            target: TRACING_TARGET,
            model_id = %model_id,
            base_url = %config.base_url,
            timeout_secs = config.timeout_secs,
            "Creating OpenAI connector"
        );

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("artflow/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(OpenAiInner {
                http,
                config,
                api_key: api_key.into(),
            }),
            model_id,
            system_prompt: None,
            params: ModelParams::new(),
        })
    }

    /// Sets a default request parameter, such as `temperature`.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Replaces the default request parameters.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Returns the connector configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.inner.config
    }

    async fn send(&self, body: &Value) -> Result<Vec<String>> {
        let response = self
            .inner
            .http
            .post(self.inner.config.completions_url())
            .bearer_auth(&self.inner.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(status_error(status, &message));
        }

        let completion: ChatCompletion = response.json().await?;
        Ok(parse_completion(completion))
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiChat {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    fn model_params(&self) -> ModelParams {
        self.params.clone()
    }

    fn with_system_prompt(&self, system_prompt: &str) -> Arc<dyn ChatModel> {
        let mut model = self.clone();
        model.system_prompt = Some(system_prompt.to_owned());
        Arc::new(model)
    }

    async fn get_response_with(
        &self,
        message: &str,
        history: Option<&ChatHistory>,
        params: &ModelParams,
    ) -> Result<Vec<String>> {
        let params = merge_params(self.params.clone(), params);
        let body = build_request(
            &self.model_id,
            self.system_prompt.as_deref(),
            history,
            message,
            params,
        );

        tracing::debug!(
            target: TRACING_TARGET,
            model_id = %self.model_id,
            history_len = history.map_or(0, ChatHistory::len),
            "Requesting chat completion"
        );

        let responses = retry_with_backoff(&self.inner.config.retry, || self.send(&body)).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            model_id = %self.model_id,
            responses = responses.len(),
            "Chat completion received"
        );
        Ok(responses)
    }
}

/// Maps an unsuccessful response status to an error.
///
/// Only `429 Too Many Requests` becomes a rate limit and is retried.
fn status_error(status: StatusCode, message: &str) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::rate_limit(format!(
            "Rate limit exceeded. Please try again later. {message}"
        ))
    } else {
        Error::provider(PROVIDER, format!("HTTP {status}: {message}"))
    }
}

/// Builds the chat completions request body.
///
/// Messages are the system prompt, the history and finally the user message.
fn build_request(
    model_id: &str,
    system_prompt: Option<&str>,
    history: Option<&ChatHistory>,
    message: &str,
    params: ModelParams,
) -> Value {
    let mut messages = Vec::new();
    if let Some(system_prompt) = system_prompt.filter(|prompt| !prompt.is_empty()) {
        messages.push(json!({ "role": "system", "content": system_prompt }));
    }
    for entry in history.into_iter().flatten() {
        messages.push(json!({ "role": entry.role().as_str(), "content": entry.text() }));
    }
    messages.push(json!({ "role": "user", "content": message }));

    let mut body = Map::new();
    body.insert("model".into(), Value::from(model_id));
    body.insert("messages".into(), Value::Array(messages));
    for (name, value) in params {
        if name != "model" && name != "messages" {
            body.insert(name, value);
        }
    }
    Value::Object(body)
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    role: String,
    content: Option<String>,
}

/// Extracts the alternative responses of a completion.
fn parse_completion(completion: ChatCompletion) -> Vec<String> {
    completion
        .choices
        .into_iter()
        .map(|choice| {
            if choice.message.role != "assistant" {
                tracing::warn!(
                    target: TRACING_TARGET,
                    role = %choice.message.role,
                    "Expected only assistant messages in completion"
                );
            }
            choice.message.content.unwrap_or_default()
        })
        .collect()
}
