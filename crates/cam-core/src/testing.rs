//! Test doubles shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use cam_types::error::RepositoryError;
use cam_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, Usage,
};
use cam_types::memory::{
    Intent, MemoryFilter, MemoryMetadata, MemoryRecord, MemoryTag, RetrievalCandidate,
    SCHEMA_VERSION, StoredMemory,
};

use crate::gate::judge::Judge;
use crate::llm::provider::LlmProvider;
use crate::memory::embedder::Embedder;
use crate::memory::vector::VectorMemoryStore;

pub fn metadata(prompt: &str, intent: Intent) -> MemoryMetadata {
    MemoryMetadata {
        timestamp: Utc::now(),
        tag: MemoryTag::Fact,
        intent,
        user_prompt: prompt.to_string(),
        topic_continued: false,
        schema_version: SCHEMA_VERSION,
        embedding_model: "fixed-test".to_string(),
        topic: "pets".to_string(),
        provider: "echo".to_string(),
        model: "echo-1".to_string(),
        access_count: 0,
        last_accessed_at: None,
    }
}

pub fn record(text: &str, embedding: Vec<f32>, intent: Intent) -> MemoryRecord {
    MemoryRecord {
        id: Uuid::now_v7(),
        text: text.to_string(),
        embedding,
        metadata: metadata(text, intent),
    }
}

pub fn candidate(text: &str, distance: f32) -> RetrievalCandidate {
    RetrievalCandidate {
        id: Uuid::now_v7(),
        text: text.to_string(),
        distance,
        metadata: metadata(text, Intent::Fact),
    }
}

/// Embedder backed by a lookup table. Unknown text is an error.
pub struct FixedEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: HashMap::new(),
            delay: None,
        }
    }

    pub fn with(mut self, text: &str, vector: impl Into<Vec<f32>>) -> Self {
        self.table.insert(text.to_string(), vector.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Embedder for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        texts
            .iter()
            .map(|t| {
                self.table
                    .get(t)
                    .cloned()
                    .ok_or_else(|| RepositoryError::Embedding(format!("no vector for '{t}'")))
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        "fixed-test"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Judge answering by instruction substring. No match is a provider error.
#[derive(Clone, Default)]
pub struct ScriptedJudge {
    rules: Arc<Vec<(String, String)>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, answer: &str) -> Self {
        let mut rules = (*self.rules).clone();
        rules.push((needle.to_string(), answer.to_string()));
        Self {
            rules: Arc::new(rules),
            calls: self.calls,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Judge for ScriptedJudge {
    async fn verdict(&self, instructions: &str, _input: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rules
            .iter()
            .find(|(needle, _)| instructions.contains(needle.as_str()))
            .map(|(_, answer)| answer.clone())
            .ok_or_else(|| LlmError::Provider {
                message: "no scripted answer".to_string(),
            })
    }
}

/// Provider that echoes the last message, or fails.
pub struct EchoProvider {
    capabilities: ProviderCapabilities,
    fixed: Option<String>,
    fail: bool,
    delay: Option<Duration>,
}

impl EchoProvider {
    fn base() -> Self {
        Self {
            capabilities: ProviderCapabilities {
                max_context_tokens: 8192,
                max_output_tokens: 1024,
            },
            fixed: None,
            fail: false,
            delay: None,
        }
    }

    pub fn ok() -> Self {
        Self::base()
    }

    pub fn answering(answer: &str) -> Self {
        Self {
            fixed: Some(answer.to_string()),
            ..Self::base()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::base()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        "echo-1"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(LlmError::Overloaded("busy".to_string()));
        }
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(CompletionResponse {
            id: "resp-echo".to_string(),
            content: self.fixed.clone().unwrap_or_else(|| format!("echo: {last}")),
            model: "echo-model".to_string(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}

/// Store whose every operation fails.
pub struct FailingStore;

fn unavailable() -> RepositoryError {
    RepositoryError::Query("store unavailable".to_string())
}

impl VectorMemoryStore for FailingStore {
    async fn insert(&self, _record: &MemoryRecord) -> Result<(), RepositoryError> {
        Err(unavailable())
    }

    async fn query(
        &self,
        _embedding: &[f32],
        _k: usize,
        _filter: Option<&MemoryFilter>,
    ) -> Result<Vec<RetrievalCandidate>, RepositoryError> {
        Err(unavailable())
    }

    async fn get_recent(&self, _n: usize) -> Result<Vec<Vec<f32>>, RepositoryError> {
        Err(unavailable())
    }

    async fn peek(&self, _n: usize) -> Result<Vec<StoredMemory>, RepositoryError> {
        Err(unavailable())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Err(unavailable())
    }

    async fn reinforce(&self, _ids: &[Uuid]) -> Result<(), RepositoryError> {
        Err(unavailable())
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        Err(unavailable())
    }
}
