//! Anthropic Claude provider over the Messages API (`/v1/messages`).
//!
//! Non-streaming only. The API key is a [`SecretString`] and is exposed
//! only when the request headers are built.

pub mod types;

use secrecy::{ExposeSecret, SecretString};

use cam_core::llm::provider::LlmProvider;
use cam_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, ProviderCapabilities,
    StopReason, Usage,
};

use self::types::{AnthropicErrorBody, AnthropicMessage, AnthropicRequest, AnthropicResponse};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header.
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
///
/// Does NOT derive Debug, so the key cannot end up in logs.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    capabilities: ProviderCapabilities,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: model.to_string(),
            capabilities: capabilities_for_model(model),
        }
    }

    /// Point at a proxy or a local mock instead of the public API.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn build_request(&self, request: &CompletionRequest) -> AnthropicRequest {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        // The Messages API takes system text as a top-level field.
        let mut system: Vec<&str> = request.system.as_deref().into_iter().collect();
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            match message.role {
                MessageRole::System => system.push(&message.content),
                MessageRole::User | MessageRole::Assistant => messages.push(AnthropicMessage {
                    role: message.role.to_string(),
                    content: message.content.clone(),
                }),
            }
        }

        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: request.temperature,
        }
    }
}

fn capabilities_for_model(model: &str) -> ProviderCapabilities {
    let max_output_tokens = if model.contains("opus") {
        32_000
    } else if model.contains("sonnet") || model.contains("haiku") {
        8_192
    } else {
        4_096
    };
    ProviderCapabilities {
        max_context_tokens: 200_000,
        max_output_tokens,
    }
}

/// Map a failed HTTP status and its body to an [`LlmError`].
fn map_status(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<AnthropicErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.to_string());
    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: None,
        },
        529 => LlmError::Overloaded(message),
        400 if message.contains("prompt is too long") => LlmError::ContextLengthExceeded,
        400 => LlmError::InvalidRequest(message),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        Some("refusal") => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(request);

        let response = self
            .client
            .post(self.url("/v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), &error_body));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        Ok(CompletionResponse {
            content: parsed.text(),
            stop_reason: map_stop_reason(parsed.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
            id: parsed.id,
            model: parsed.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_types::llm::Message;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(
            SecretString::from("test-key-not-real".to_string()),
            "claude-sonnet-4-20250514",
        )
    }

    #[test]
    fn test_name_model_and_capabilities() {
        let p = provider();
        assert_eq!(p.name(), "anthropic");
        assert_eq!(LlmProvider::model(&p), "claude-sonnet-4-20250514");
        assert_eq!(p.capabilities().max_context_tokens, 200_000);
        assert_eq!(p.capabilities().max_output_tokens, 8_192);

        let opus = AnthropicProvider::new(SecretString::from("k".to_string()), "claude-opus-4");
        assert_eq!(opus.capabilities().max_output_tokens, 32_000);
    }

    #[test]
    fn test_build_request_moves_system_text_out_of_messages() {
        let request = CompletionRequest {
            model: String::new(),
            messages: vec![
                Message {
                    role: MessageRole::System,
                    content: "Context:\nMy cat is named Luna.".to_string(),
                },
                Message {
                    role: MessageRole::User,
                    content: "What is my cat's name?".to_string(),
                },
            ],
            system: Some("Reply with only the label.".to_string()),
            max_tokens: 16,
            temperature: Some(0.0),
        };

        let body = provider().build_request(&request);
        assert_eq!(body.model, "claude-sonnet-4-20250514");
        assert_eq!(body.max_tokens, 16);
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(
            body.system.as_deref(),
            Some("Reply with only the label.\n\nContext:\nMy cat is named Luna.")
        );
    }

    #[test]
    fn test_single_turn_without_system() {
        let request = CompletionRequest::single_turn(None, "Hi", 1024);
        let body = provider().build_request(&request);
        assert!(body.system.is_none());
        assert_eq!(body.messages[0].content, "Hi");
    }

    #[test]
    fn test_map_status() {
        assert!(matches!(map_status(401, ""), LlmError::AuthenticationFailed));
        assert!(matches!(map_status(429, ""), LlmError::RateLimited { .. }));

        let overloaded = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match map_status(529, overloaded) {
            LlmError::Overloaded(msg) => assert_eq!(msg, "Overloaded"),
            other => panic!("Expected Overloaded, got: {other}"),
        }

        let too_long = r#"{"type":"error","error":{"type":"invalid_request_error","message":"prompt is too long: 210000 tokens"}}"#;
        assert!(matches!(map_status(400, too_long), LlmError::ContextLengthExceeded));
        assert!(matches!(map_status(400, "bad"), LlmError::InvalidRequest(_)));

        match map_status(500, "<html>oops</html>") {
            LlmError::Provider { message } => assert!(message.contains("HTTP 500")),
            other => panic!("Expected Provider, got: {other}"),
        }
    }

    #[test]
    fn test_map_stop_reason() {
        assert_eq!(map_stop_reason(Some("end_turn")), StopReason::EndTurn);
        assert_eq!(map_stop_reason(Some("max_tokens")), StopReason::MaxTokens);
        assert_eq!(map_stop_reason(Some("refusal")), StopReason::ContentFilter);
        assert_eq!(map_stop_reason(None), StopReason::EndTurn);
    }

    #[test]
    fn test_base_url_override() {
        let p = provider().with_base_url("http://localhost:8080/");
        assert_eq!(p.url("/v1/messages"), "http://localhost:8080/v1/messages");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_provider_error() {
        let p = provider().with_base_url("http://127.0.0.1:9");
        let request = CompletionRequest::single_turn(None, "Hi", 16);
        assert!(matches!(
            p.complete(&request).await,
            Err(LlmError::Provider { .. })
        ));
    }
}
