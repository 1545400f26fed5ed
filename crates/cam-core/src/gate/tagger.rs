//! Assigns a [`MemoryTag`] to a record at write time.

use std::sync::Arc;

use cam_types::memory::MemoryTag;

use super::judge::{Judge, ask, first_word};
use crate::config::ConfigHandle;

/// Judge instructions listing every tag in [`MemoryTag::ALL`].
fn tag_instructions() -> String {
    let allowed = MemoryTag::ALL
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Assign one tag to the user's message.\n\
         Allowed tags: {allowed}.\n\
         Use {} if no tag clearly applies. Reply with only the tag.",
        MemoryTag::None
    )
}

/// Tags records from the closed vocabulary. Anything else becomes `NONE`.
pub struct AutoTagger<J> {
    judge: Arc<J>,
    config: ConfigHandle,
    instructions: String,
}

impl<J: Judge> AutoTagger<J> {
    pub fn new(judge: Arc<J>, config: ConfigHandle) -> Self {
        Self {
            judge,
            config,
            instructions: tag_instructions(),
        }
    }

    pub async fn tag(&self, text: &str) -> MemoryTag {
        let timeout = self.config.current().pipeline.call_timeout();
        match ask(self.judge.as_ref(), &self.instructions, text, timeout).await {
            Ok(answer) => first_word(&answer).parse().unwrap_or_else(|_| {
                tracing::debug!(answer = %answer, "Tag outside vocabulary; using NONE");
                MemoryTag::None
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Tagging failed; using NONE");
                MemoryTag::None
            }
        }
    }
}
