//! OpenAI-compatible chat completions through the memory pipeline.
//!
//! POST /v1/chat/completions
//!
//! The last message is the prompt. It is classified, augmented with
//! memory, answered by the configured provider and stored if the write
//! gate accepts it. Earlier messages are ignored: the memory store is the
//! conversation state.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::error::AppError;
use crate::state::AppState;

/// Request body, a subset of the OpenAI chat completion request.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: OutgoingMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct OutgoingMessage {
    pub role: &'static str,
    pub content: String,
}

/// The prompt carried by a request: the last message's content, trimmed.
pub fn extract_prompt(messages: &[IncomingMessage]) -> Option<&str> {
    messages
        .last()
        .map(|message| message.content.trim())
        .filter(|content| !content.is_empty())
}

impl ChatCompletionResponse {
    pub fn new(model: String, content: String) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::now_v7().simple()),
            object: "chat.completion",
            created: chrono::Utc::now().timestamp(),
            model,
            choices: vec![Choice {
                index: 0,
                message: OutgoingMessage {
                    role: "assistant",
                    content,
                },
                finish_reason: "stop",
            }],
        }
    }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(body): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, AppError> {
    let prompt = extract_prompt(&body.messages)
        .ok_or_else(|| AppError::Validation("The last message must have content".to_string()))?;
    let provider = state.provider.as_deref().ok_or_else(|| {
        AppError::Unavailable("No LLM provider configured on this server".to_string())
    })?;

    if let Some(requested) = body.model.as_deref().filter(|m| *m != state.model) {
        tracing::debug!(requested, serving = %state.model, "ignoring requested model");
    }

    let outcome = state.pipeline.run_turn(prompt, provider).await;
    tracing::info!(
        intent = %outcome.turn.intent,
        memories = outcome.turn.candidates.len(),
        stored = outcome.commit.is_stored(),
        "proxied chat turn"
    );

    Ok(Json(ChatCompletionResponse::new(
        state.model.clone(),
        outcome.answer,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> ChatCompletionRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_prompt_is_last_message() {
        let request = parse(
            r#"{"model":"gpt-4o-mini","messages":[
                {"role":"system","content":"Be brief."},
                {"role":"user","content":"  What is my cat's name?  "}
            ]}"#,
        );
        assert_eq!(extract_prompt(&request.messages), Some("What is my cat's name?"));
    }

    #[test]
    fn test_missing_or_blank_prompt() {
        assert_eq!(extract_prompt(&parse("{}").messages), None);
        let blank = parse(r#"{"messages":[{"role":"user","content":"   "}]}"#);
        assert_eq!(extract_prompt(&blank.messages), None);
    }

    #[test]
    fn test_response_shape() {
        let response = ChatCompletionResponse::new("gpt-4o-mini".into(), "Luna.".into());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(value["choices"][0]["message"]["content"], "Luna.");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert!(value["id"].as_str().unwrap().starts_with("chatcmpl-"));
    }
}
