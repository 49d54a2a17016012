use crate::client_wrapper::{Completion, CompletionError, Message};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Request body of an OpenAI-compatible `/chat/completions` call.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
}

/// Turn a `/chat/completions` response body into a [`Completion`].
///
/// - no `choices` (absent, `null` or empty) is an error
/// - a first choice without `message.content` is an error
/// - missing `usage` or `usage.total_tokens` counts as `0` tokens
pub fn parse_completion_payload(
    payload: &Value,
    elapsed: Duration,
) -> Result<Completion, CompletionError> {
    let first_choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or(CompletionError::MissingChoices)?;

    let text = first_choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            CompletionError::InvalidPayload("first choice has no message content".to_string())
        })?
        .to_string();

    let tokens = payload
        .pointer("/usage/total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    Ok(Completion {
        text,
        tokens,
        elapsed,
    })
}

/// Extract model identifiers from a `/models` response body (`{"data": [{"id": ..}, ..]}`).
pub fn parse_model_list(payload: &Value) -> Result<Vec<String>, CompletionError> {
    let data = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| CompletionError::InvalidPayload("missing model data".to_string()))?;

    Ok(data
        .iter()
        .filter_map(|model| model.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}
