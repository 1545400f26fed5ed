//! Completion calls with a bounded wait and an opaque failure string.

use std::time::Duration;

use cam_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::box_provider::BoxLlmProvider;

/// Returned in place of an answer when the completion call fails.
pub const COMPLETION_FAILED: &str = "(Error: LLM request failed)";

/// Default output budget for the user-facing answer.
pub const ANSWER_MAX_TOKENS: u32 = 1024;

/// `provider.complete` bounded by `timeout`.
pub async fn complete_with_timeout(
    provider: &BoxLlmProvider,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<CompletionResponse, LlmError> {
    match tokio::time::timeout(timeout, provider.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Answer `prompt` as plain text.
///
/// Errors never propagate: any failure is logged and surfaces as
/// [`COMPLETION_FAILED`].
#[tracing::instrument(
    name = "complete_text",
    skip(provider, prompt),
    fields(provider = %provider.name(), prompt_len = prompt.len())
)]
pub async fn complete_text(provider: &BoxLlmProvider, prompt: &str, timeout: Duration) -> String {
    let request = CompletionRequest::single_turn(None, prompt, ANSWER_MAX_TOKENS);
    match complete_with_timeout(provider, &request, timeout).await {
        Ok(response) => response.content,
        Err(e) => {
            tracing::warn!(error = %e, "Completion failed");
            COMPLETION_FAILED.to_string()
        }
    }
}
