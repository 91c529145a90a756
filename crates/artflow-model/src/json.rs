//! Model-assisted JSON parsing.

use serde_json::Value;

use crate::chat::ChatModel;
use crate::error::{Error, Result};

const TRACING_TARGET: &str = "artflow_model::json";

/// System prompt asking a model to repair JSON syntax.
pub const JSON_REPAIR_SYNTAX_SYSTEM_PROMPT: &str = "\
You must correct the syntax in a JSON string provided by the user. \
Take your time to ensure the syntax is correct. \
Return only the corrected JSON, with no additional formatting or context.";

/// System prompt asking a model to repair JSON content; `{error}` is
/// replaced with the validation error.
pub const JSON_REPAIR_CONTENT_SYSTEM_PROMPT: &str = "\
You must correct the following ERROR in a JSON string provided by the user. \
Take your time to ensure the resulting JSON corrects the error and has correct syntax. \
Return only the corrected JSON, with no additional formatting or context.

ERROR: {error}";

/// Validates a parsed value, returning a description of the problem if it
/// is invalid.
pub type JsonValidator = dyn Fn(&Value) -> Option<String> + Send + Sync;

/// Parses `json`, asking `model` to repair it when parsing fails.
///
/// If a validator is given and rejects the parsed value, the model is asked
/// once more to fix the content, guided by the validation error. Only the
/// first response of the model is used.
pub async fn parse_json_autofix(
    json: &str,
    model: &dyn ChatModel,
    validator: Option<&JsonValidator>,
) -> Result<Value> {
    let (json, parsed) = match serde_json::from_str::<Value>(json) {
        Ok(parsed) => (json.to_owned(), parsed),
        Err(_) => {
            tracing::warn!(target: TRACING_TARGET, json, "Attempting to fix malformed JSON");
            let fixed = repair(model, JSON_REPAIR_SYNTAX_SYSTEM_PROMPT, json).await?;
            match serde_json::from_str::<Value>(&fixed) {
                Ok(parsed) => (fixed, parsed),
                Err(error) => {
                    return Err(Error::json(format!(
                        "Failed to fix malformed JSON with error '{error}':\n{fixed}"
                    )));
                }
            }
        }
    };

    let Some(validator) = validator else {
        return Ok(parsed);
    };
    let Some(error) = validator(&parsed) else {
        return Ok(parsed);
    };

    tracing::warn!(
        target: TRACING_TARGET,
        %error,
        json = %json,
        "Attempting to fix failed validation"
    );
    let prompt = JSON_REPAIR_CONTENT_SYSTEM_PROMPT.replace("{error}", &error);
    let fixed = repair(model, &prompt, &json).await?;

    match serde_json::from_str::<Value>(&fixed) {
        Ok(parsed) => match validator(&parsed) {
            None => return Ok(parsed),
            Some(new_error) => tracing::warn!(
                target: TRACING_TARGET,
                error = %new_error,
                json = %fixed,
                "Validation still fails after fixing the previous error"
            ),
        },
        Err(parse_error) => tracing::warn!(
            target: TRACING_TARGET,
            error = %parse_error,
            json = %fixed,
            "Malformed JSON after fixing a validation error"
        ),
    }

    Err(Error::json(format!(
        "Failed to fix JSON after validation error '{error}':\n{json}"
    )))
}

async fn repair(model: &dyn ChatModel, system_prompt: &str, json: &str) -> Result<String> {
    let responses = model
        .with_system_prompt(system_prompt)
        .get_response(json, None)
        .await?;
    let response = responses
        .into_iter()
        .next()
        .ok_or_else(|| Error::json("model returned no response when repairing JSON"))?;
    Ok(strip_code_fence(&response).to_owned())
}

/// Removes a surrounding markdown code fence, as in `` ```json ... ``` ``.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return text;
    };
    match inner.split_once('\n') {
        Some((language, body)) if !language.contains(['{', '[']) => body.trim(),
        _ => inner.trim(),
    }
}
