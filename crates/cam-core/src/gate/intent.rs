//! Intent classification: `fact`, `query` or `meta`.

use std::sync::Arc;

use cam_types::memory::Intent;

use super::judge::{Judge, ask, first_word};
use crate::config::ConfigHandle;

/// First tokens that mark a question.
const QUESTION_OPENERS: &[&str] = &[
    "what", "who", "when", "where", "why", "how", "is", "are", "can", "do", "does", "did",
];

/// Phrases that refer back to the conversation or the memory itself.
const MEMORY_REFERENCES: &[&str] = &[
    "remember",
    "recall",
    "you said",
    "tell me what i said",
    "what did i",
    "when did i",
    "show me",
];

const INTENT_INSTRUCTIONS: &str = "Classify the user's message into exactly one label.\n\
fact: the user shares new personal or contextual information.\n\
query: the user asks for knowledge or an answer.\n\
meta: the user refers to earlier messages, timestamps, or your memory.\n\
Reply with only the label: fact, query, or meta.";

/// Outcome of the deterministic rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerdict {
    Decided(Intent),
    /// No rule fired; the judge decides.
    Ambiguous,
}

/// Apply the ordered rule set. Pure and deterministic.
pub fn classify_by_rules(prompt: &str) -> RuleVerdict {
    let lowered = prompt.trim().to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    if tokens.len() < 2 {
        return RuleVerdict::Decided(Intent::Meta);
    }

    let opener = tokens[0].trim_matches(|c: char| !c.is_alphanumeric());
    // "what's", "how's"
    let opener = opener
        .strip_suffix("'s")
        .or_else(|| opener.strip_suffix("\u{2019}s"))
        .unwrap_or(opener);
    if QUESTION_OPENERS.contains(&opener) {
        return RuleVerdict::Decided(Intent::Query);
    }

    if MEMORY_REFERENCES.iter().any(|phrase| lowered.contains(phrase)) {
        return RuleVerdict::Decided(Intent::Meta);
    }

    if lowered.ends_with('?') {
        return RuleVerdict::Decided(Intent::Query);
    }

    RuleVerdict::Ambiguous
}

/// Map a judge answer onto a label. Anything unrecognised is `fact`.
fn parse_label(answer: &str) -> Intent {
    match first_word(answer).as_str() {
        "query" => Intent::Query,
        "meta" => Intent::Meta,
        _ => Intent::Fact,
    }
}

/// Labels prompts with an [`Intent`].
///
/// Fails open: a judge failure or timeout yields `Fact`, so new information
/// is offered to the write gate rather than silently dropped.
pub struct IntentClassifier<J> {
    judge: Arc<J>,
    config: ConfigHandle,
}

impl<J: Judge> IntentClassifier<J> {
    pub fn new(judge: Arc<J>, config: ConfigHandle) -> Self {
        Self { judge, config }
    }

    #[tracing::instrument(name = "classify_intent", skip_all, fields(prompt_len = prompt.len()))]
    pub async fn classify(&self, prompt: &str) -> Intent {
        if let RuleVerdict::Decided(intent) = classify_by_rules(prompt) {
            tracing::debug!(%intent, source = "rules", "Intent classified");
            return intent;
        }

        let timeout = self.config.current().pipeline.call_timeout();
        match ask(self.judge.as_ref(), INTENT_INSTRUCTIONS, prompt, timeout).await {
            Ok(answer) => {
                let intent = parse_label(&answer);
                tracing::debug!(%intent, source = "judge", answer = %answer, "Intent classified");
                intent
            }
            Err(e) => {
                tracing::warn!(error = %e, "Intent judge failed; defaulting to fact");
                Intent::Fact
            }
        }
    }
}
