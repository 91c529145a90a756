//! Mock chat model for testing.
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! artflow-model = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::chat::{ChatHistory, ChatModel, ModelParams, merge_params};
use crate::error::{Error, Result};

/// Model id reported by [`MockChatModel`] unless overridden.
pub const MOCK_MODEL_ID: &str = "mock";

#[derive(Debug)]
enum MockMode {
    Fixed(Vec<String>),
    Scripted(Mutex<VecDeque<String>>),
    Echo,
}

/// A request received by a [`MockChatModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    /// The user message.
    pub message: String,
    /// The system prompt of the model that received the request.
    pub system_prompt: Option<String>,
    /// Number of messages in the history sent with the request.
    pub history_len: usize,
    /// Effective request parameters.
    pub params: ModelParams,
}

#[derive(Debug)]
struct MockState {
    mode: MockMode,
    calls: AtomicUsize,
    rate_limited: AtomicUsize,
    requests: Mutex<Vec<MockRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A chat model returning canned responses.
///
/// Clones, including those made by
/// [`with_system_prompt`](ChatModel::with_system_prompt), share the call
/// counter, the recorded requests and the script.
#[derive(Debug, Clone)]
pub struct MockChatModel {
    model_id: String,
    system_prompt: Option<String>,
    params: ModelParams,
    state: Arc<MockState>,
}

impl MockChatModel {
    fn with_mode(mode: MockMode) -> Self {
        Self {
            model_id: MOCK_MODEL_ID.to_owned(),
            system_prompt: None,
            params: ModelParams::new(),
            state: Arc::new(MockState {
                mode,
                calls: AtomicUsize::new(0),
                rate_limited: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Always returns the same responses.
    pub fn fixed<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_mode(MockMode::Fixed(responses.into_iter().map(Into::into).collect()))
    }

    /// Returns the next scripted response on each call and fails once the
    /// script is exhausted.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = responses.into_iter().map(Into::into).collect();
        Self::with_mode(MockMode::Scripted(Mutex::new(script)))
    }

    /// Responds with the user message.
    pub fn echo() -> Self {
        Self::with_mode(MockMode::Echo)
    }

    /// Sets the reported model id.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Sets the default model parameters.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Makes the next `count` calls fail with a rate limit error.
    pub fn rate_limit_next(self, count: usize) -> Self {
        self.state.rate_limited.store(count, Ordering::SeqCst);
        self
    }

    /// Returns the number of calls made, including failed ones.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<MockRequest> {
        lock(&self.state.requests).clone()
    }
}

#[async_trait::async_trait]
impl ChatModel for MockChatModel {
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
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.requests).push(MockRequest {
            message: message.to_owned(),
            system_prompt: self.system_prompt.clone(),
            history_len: history.map_or(0, ChatHistory::len),
            params: merge_params(self.params.clone(), params),
        });

        let rate_limited = self
            .state
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if rate_limited.is_ok() {
            return Err(Error::rate_limit("mock rate limit"));
        }

        match &self.state.mode {
            MockMode::Fixed(responses) => Ok(responses.clone()),
            MockMode::Scripted(script) => lock(script)
                .pop_front()
                .map(|response| vec![response])
                .ok_or_else(|| Error::provider(MOCK_MODEL_ID, "script exhausted")),
            MockMode::Echo => Ok(vec![message.to_owned()]),
        }
    }
}
