//! One-word topic label stored with each memory.

use std::sync::Arc;

use super::judge::{Judge, ask, first_word};
use crate::config::ConfigHandle;

/// Stored when no topic could be extracted.
pub const UNKNOWN_TOPIC: &str = "unknown";

/// Longest topic kept; anything longer is not a single word.
const MAX_TOPIC_CHARS: usize = 32;

const TOPIC_INSTRUCTIONS: &str = "Name the main topic of the user's message in one lowercase \
word, such as pets, travel, work or health. Reply with only that word.";

/// Labels a prompt with a single lowercase topic word.
pub struct TopicExtractor<J> {
    judge: Arc<J>,
    config: ConfigHandle,
}

impl<J: Judge> TopicExtractor<J> {
    pub fn new(judge: Arc<J>, config: ConfigHandle) -> Self {
        Self { judge, config }
    }

    /// Falls back to [`UNKNOWN_TOPIC`] on failure or an unusable answer.
    pub async fn extract(&self, text: &str) -> String {
        let timeout = self.config.current().pipeline.call_timeout();
        match ask(self.judge.as_ref(), TOPIC_INSTRUCTIONS, text, timeout).await {
            Ok(answer) => {
                let topic = first_word(&answer);
                if topic.is_empty() || topic.chars().count() > MAX_TOPIC_CHARS {
                    tracing::debug!(answer = %answer, "No usable topic in answer");
                    UNKNOWN_TOPIC.to_string()
                } else {
                    topic
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Topic extraction failed");
                UNKNOWN_TOPIC.to_string()
            }
        }
    }
}
