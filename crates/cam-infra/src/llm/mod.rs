//! LLM provider implementations.
//!
//! [`create_provider`] builds a [`BoxLlmProvider`] for a named backend:
//! Anthropic over its Messages API, everything else over the
//! OpenAI-compatible client. The same provider serves the main answer and
//! the gating judges.

pub mod anthropic;
pub mod openai_compat;

use secrecy::SecretString;

use cam_core::llm::box_provider::BoxLlmProvider;
use cam_types::llm::{LlmError, ProviderCapabilities};

use self::anthropic::AnthropicProvider;
use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Well-known provider names accepted by [`create_provider`].
pub const PROVIDER_NAMES: [&str; 4] = ["openai", "anthropic", "gemini", "mistral"];

/// Create a provider by name.
///
/// `anthropic` always speaks the Messages API, at `base_url` when given.
/// For any other name, a `base_url` selects an OpenAI-compatible endpoint
/// labelled with that name (self-hosted or proxy endpoints). Without one,
/// the name must be one of [`PROVIDER_NAMES`].
pub fn create_provider(
    name: &str,
    api_key: SecretString,
    model: &str,
    base_url: Option<&str>,
) -> Result<BoxLlmProvider, LlmError> {
    if name == "anthropic" {
        let mut provider = AnthropicProvider::new(api_key, model);
        if let Some(base_url) = base_url {
            provider = provider.with_base_url(base_url);
        }
        tracing::debug!(provider = name, model, "LLM provider created");
        return Ok(BoxLlmProvider::new(provider));
    }

    let provider = match base_url {
        Some(base_url) => OpenAiCompatibleProvider::new(OpenAiCompatConfig {
            provider_name: name.to_string(),
            base_url: base_url.to_string(),
            api_key,
            model: model.to_string(),
            capabilities: ProviderCapabilities {
                max_context_tokens: 128_000,
                max_output_tokens: 16_384,
            },
        }),
        None => match name {
            "openai" => OpenAiCompatibleProvider::openai(api_key, model),
            "gemini" => OpenAiCompatibleProvider::gemini(api_key, model),
            "mistral" => OpenAiCompatibleProvider::mistral(api_key, model),
            other => {
                return Err(LlmError::InvalidRequest(format!(
                    "unknown provider '{other}' (expected one of {}, or set a base URL)",
                    PROVIDER_NAMES.join(", ")
                )));
            }
        },
    };
    tracing::debug!(provider = name, model, "LLM provider created");
    Ok(BoxLlmProvider::new(provider))
}
