//! Write gate: does this prompt deserve to become a memory record?

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use cam_types::config::UsefulnessFilterConfig;
use cam_types::memory::Intent;

use super::judge::{Judge, ask, first_word};
use crate::config::ConfigHandle;

/// A prompt that is nothing but an acknowledgement.
static FILLER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(yes|yeah|yep|no|nope|ok|okay|sure|maybe|hmm+|thanks|thank you|cool|nice|great|lol|haha|idk)\s*[.!?]*\s*$",
    )
    .ok()
});

/// Copula, possession and attribution verbs of a standalone factual statement.
static FACTUAL_PREDICATE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(is|am|are|was|were|have|has|called|named|lives|works|likes|owns|contains)\b",
    )
    .ok()
});

const USEFULNESS_INSTRUCTIONS: &str = "Decide whether the user's message conveys a standalone \
personal fact, relationship, or property worth remembering later.\n\
Reply with only true or false.";

/// Why a prompt was not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// Below the character or word minimum.
    TooShort,
    /// Contains this blacklist phrase.
    Blacklisted(String),
    /// Pure acknowledgement.
    Filler,
    /// Questions and memory references are never stored.
    NotAFact(Intent),
    /// The judge said no.
    JudgeDeclined,
    /// The judge failed or gave no usable answer.
    JudgeUnavailable,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooShort => write!(f, "too short"),
            RejectReason::Blacklisted(phrase) => write!(f, "blacklisted phrase '{phrase}'"),
            RejectReason::Filler => write!(f, "filler"),
            RejectReason::NotAFact(intent) => write!(f, "intent is {intent}"),
            RejectReason::JudgeDeclined => write!(f, "judged not useful"),
            RejectReason::JudgeUnavailable => write!(f, "judge unavailable"),
        }
    }
}

/// Outcome of the deterministic rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    Reject(RejectReason),
    /// A factual predicate was found.
    Accept,
    /// No rule fired; the judge decides.
    Ambiguous,
}

/// Final write decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum WriteDecision {
    Accept,
    Reject(RejectReason),
}

impl WriteDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, WriteDecision::Accept)
    }
}

/// Lowercased words, split on anything but letters, digits and apostrophes.
fn normalized_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Whether `phrase` occurs in `words` as a whole-word sequence.
fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle = normalized_words(phrase);
    !needle.is_empty()
        && words
            .windows(needle.len())
            .any(|window| window == needle.as_slice())
}

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Apply the ordered rule set. Pure and deterministic.
pub fn screen(prompt: &str, config: &UsefulnessFilterConfig) -> Screening {
    let trimmed = prompt.trim();
    if trimmed.chars().count() < config.min_char_count
        || trimmed.split_whitespace().count() < config.min_word_count
    {
        return Screening::Reject(RejectReason::TooShort);
    }

    let words = normalized_words(trimmed);
    if let Some(phrase) = config
        .blacklist_phrases
        .iter()
        .find(|phrase| contains_phrase(&words, phrase))
    {
        return Screening::Reject(RejectReason::Blacklisted(phrase.clone()));
    }
    if matches(&FILLER_RE, trimmed) {
        return Screening::Reject(RejectReason::Filler);
    }

    if matches(&FACTUAL_PREDICATE_RE, trimmed) {
        return Screening::Accept;
    }
    Screening::Ambiguous
}

/// Decides whether a completed interaction becomes a memory record.
///
/// Fails closed: a judge failure or timeout rejects.
pub struct WriteGate<J> {
    judge: Arc<J>,
    config: ConfigHandle,
}

impl<J: Judge> WriteGate<J> {
    pub fn new(judge: Arc<J>, config: ConfigHandle) -> Self {
        Self { judge, config }
    }

    /// Whether `prompt` carries standalone information.
    pub async fn is_useful(&self, prompt: &str) -> bool {
        self.judge_usefulness(prompt).await.is_accept()
    }

    /// Full write decision, combined with the prompt's intent.
    #[tracing::instrument(name = "write_gate", skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn evaluate(&self, prompt: &str, intent: Intent) -> WriteDecision {
        if intent != Intent::Fact {
            return WriteDecision::Reject(RejectReason::NotAFact(intent));
        }
        self.judge_usefulness(prompt).await
    }

    async fn judge_usefulness(&self, prompt: &str) -> WriteDecision {
        let config = self.config.current();
        match screen(prompt, &config.usefulness_filter) {
            Screening::Reject(reason) => {
                tracing::debug!(%reason, "Rejected by rules");
                return WriteDecision::Reject(reason);
            }
            Screening::Accept => return WriteDecision::Accept,
            Screening::Ambiguous => {}
        }

        let timeout = config.pipeline.call_timeout();
        match ask(self.judge.as_ref(), USEFULNESS_INSTRUCTIONS, prompt, timeout).await {
            Ok(answer) => match first_word(&answer).as_str() {
                "true" => WriteDecision::Accept,
                "false" => WriteDecision::Reject(RejectReason::JudgeDeclined),
                _ => {
                    tracing::warn!(answer = %answer, "Unrecognised usefulness verdict; rejecting");
                    WriteDecision::Reject(RejectReason::JudgeUnavailable)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Usefulness judge failed; rejecting");
                WriteDecision::Reject(RejectReason::JudgeUnavailable)
            }
        }
    }
}
