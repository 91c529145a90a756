//! Flow steps backed by chat models.
//!
//! Models are shared behind an [`Arc`], so the same client (and its
//! response cache) serves every branch and record of a run.

use std::sync::Arc;

use artflow_flow::{Arguments, Record, Step, step};
use serde_json::{Map, Value};

use crate::chat::ChatModel;
use crate::multi_turn::{MultiTurnConfig, multi_turn};

/// Field holding the user message sent to the model.
pub const PROMPT_FIELD: &str = "prompt";

/// Optional field overriding the model's system prompt.
pub const SYSTEM_PROMPT_FIELD: &str = "system_prompt";

/// Field holding a model response.
pub const RESPONSE_FIELD: &str = "response";

/// Field holding the objective of a multi-turn conversation.
pub const OBJECTIVE_FIELD: &str = "objective";

/// Creates a step sending the `prompt` field to `model`.
///
/// If the record has a `system_prompt` field, it replaces the model's system
/// prompt. The step produces one record with a `response` field per
/// alternative response.
pub fn chat_step(name: impl Into<String>, model: Arc<dyn ChatModel>) -> Step {
    step(name, move |args: Arguments| {
        let model = Arc::clone(&model);
        async move {
            let prompt: String = args.get(PROMPT_FIELD)?;
            let model = match args.get_opt::<String>(SYSTEM_PROMPT_FIELD)? {
                Some(system_prompt) => model.with_system_prompt(&system_prompt),
                None => model,
            };

            let responses = model.get_response(&prompt, None).await?;
            anyhow::Ok(
                responses
                    .into_iter()
                    .map(|response| Record::new().with(RESPONSE_FIELD, response))
                    .collect::<Vec<_>>(),
            )
        }
    })
    .require([PROMPT_FIELD])
    .optional([SYSTEM_PROMPT_FIELD])
}

/// Creates a step running a multi-turn conversation between `challenger`
/// and `target` for the `objective` field.
///
/// Any other declared fields are passed as additional template attributes.
/// The step produces a record with the `messages` of the conversation and
/// its `success` flag.
pub fn multi_turn_step(
    name: impl Into<String>,
    target: Arc<dyn ChatModel>,
    challenger: Arc<dyn ChatModel>,
    config: MultiTurnConfig,
) -> Step {
    let config = Arc::new(config);
    step(name, move |args: Arguments| {
        let target = Arc::clone(&target);
        let challenger = Arc::clone(&challenger);
        let config = Arc::clone(&config);
        async move {
            let objective: String = args.get(OBJECTIVE_FIELD)?;
            let attributes: Map<String, Value> = args
                .into_record()
                .into_iter()
                .filter(|(field, _)| field != OBJECTIVE_FIELD)
                .collect();

            let conversation =
                multi_turn(&target, &challenger, &objective, &config, &attributes).await?;
            anyhow::Ok(
                Record::new()
                    .with("messages", serde_json::to_value(&conversation.messages)?)
                    .with("success", conversation.success),
            )
        }
    })
    .require([OBJECTIVE_FIELD])
}
