//! Pluggable judge for the ambiguous cases the deterministic rules leave open.
//!
//! The intent classifier, write gate and tagger each try a cheap rule set
//! first and only then ask a [`Judge`]. Production wires in [`LlmJudge`];
//! tests substitute a scripted one.

use std::sync::Arc;
use std::time::Duration;

use cam_types::llm::{CompletionRequest, LlmError};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::complete::complete_with_timeout;

/// A constrained oracle: given instructions and an input, return a short label.
pub trait Judge: Send + Sync {
    fn verdict(
        &self,
        instructions: &str,
        input: &str,
    ) -> impl std::future::Future<Output = Result<String, LlmError>> + Send;
}

/// Judge backed by an LLM completion at temperature 0.
///
/// Built without a provider it fails every call with
/// [`LlmError::Unavailable`], which each caller maps to its own default.
pub struct LlmJudge {
    provider: Option<Arc<BoxLlmProvider>>,
    timeout: Duration,
}

/// Labels are one word; keep the budget tight.
const JUDGE_MAX_TOKENS: u32 = 8;

impl LlmJudge {
    pub fn new(provider: Arc<BoxLlmProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    /// A judge with no backing model.
    pub fn offline() -> Self {
        Self {
            provider: None,
            timeout: Duration::ZERO,
        }
    }
}

impl Judge for LlmJudge {
    #[tracing::instrument(name = "judge", skip_all, fields(input_len = input.len()))]
    async fn verdict(&self, instructions: &str, input: &str) -> Result<String, LlmError> {
        let provider = self.provider.as_ref().ok_or(LlmError::Unavailable)?;
        let request = CompletionRequest::single_turn(Some(instructions), input, JUDGE_MAX_TOKENS)
            .with_temperature(0.0);
        let response = complete_with_timeout(provider, &request, self.timeout).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Ask `judge`, bounded by `timeout`.
pub(crate) async fn ask<J: Judge>(
    judge: &J,
    instructions: &str,
    input: &str,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, judge.verdict(instructions, input)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Lowercased first word of a judge answer, stripped of punctuation.
pub(crate) fn first_word(answer: &str) -> String {
    answer
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}
