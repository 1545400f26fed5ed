//! One conversational turn through the memory gates.
//!
//! `prepare` runs before the LLM call (intent, continuity, retrieval,
//! prompt augmentation); `commit` runs after it (write gate, tagging,
//! topic extraction, insert). Writes therefore only happen once an answer exists.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use cam_types::memory::{
    Intent, MemoryMetadata, MemoryRecord, RetrievalCandidate, RetrievalMode, SCHEMA_VERSION,
    StoredMemory,
};

use crate::config::ConfigHandle;
use crate::gate::continuity::ContinuityDecider;
use crate::gate::intent::IntentClassifier;
use crate::gate::judge::Judge;
use crate::gate::retrieval::{RetrievalEngine, RetrievalOptions, render};
use crate::gate::tagger::AutoTagger;
use crate::gate::topic::TopicExtractor;
use crate::gate::usefulness::{RejectReason, WriteDecision, WriteGate};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::complete::complete_text;
use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::box_vector::BoxVectorMemoryStore;
use crate::memory::embed::embed_one;

/// The prompt sent to the LLM when memory context exists.
pub fn augment_prompt(prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("Context:\n{context}\n\nUser: {prompt}"),
        None => prompt.to_string(),
    }
}

/// How an intent turns into a retrieval, if any.
///
/// Questions get the single best global hit, memory references get the
/// annotated global context, and facts only see continuity-mode context
/// while the conversation stays on topic.
pub fn plan_retrieval(intent: Intent, topic_continued: bool, k: usize) -> Option<RetrievalOptions> {
    match intent {
        Intent::Query => Some(RetrievalOptions::new(k, RetrievalMode::Global).plain()),
        Intent::Meta => Some(RetrievalOptions::new(k, RetrievalMode::Global).with_meta()),
        Intent::Fact if topic_continued => Some(RetrievalOptions::new(k, RetrievalMode::Continuity)),
        Intent::Fact => None,
    }
}

/// The provider and model that answered the turn being committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerSource {
    pub provider: String,
    pub model: String,
}

impl AnswerSource {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn of(provider: &BoxLlmProvider) -> Self {
        Self::new(provider.name(), provider.model())
    }
}

/// Everything decided about a prompt before the LLM call.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedTurn {
    pub prompt: String,
    pub intent: Intent,
    pub topic_continued: bool,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub retrieval: Option<RetrievalOptions>,
    pub candidates: Vec<RetrievalCandidate>,
    pub context: Option<String>,
    pub augmented_prompt: String,
}

/// Why `commit` stored nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "skipped", rename_all = "snake_case")]
pub enum SkipReason {
    Rejected { reason: RejectReason },
    /// The prompt could not be embedded.
    NoEmbedding,
    /// The store refused the insert.
    StoreFailed { error: String },
}

/// Result of the post-response write step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Stored { memory: StoredMemory },
    Skipped { reason: SkipReason },
}

impl CommitOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, CommitOutcome::Stored { .. })
    }
}

/// A full turn: preparation, answer and write outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub turn: PreparedTurn,
    pub answer: String,
    pub commit: CommitOutcome,
}

/// The four gates wired to one store, embedder and judge.
pub struct MemoryPipeline<J> {
    store: Arc<BoxVectorMemoryStore>,
    embedder: Arc<BoxEmbedder>,
    config: ConfigHandle,
    classifier: IntentClassifier<J>,
    decider: ContinuityDecider,
    retrieval: RetrievalEngine,
    gate: WriteGate<J>,
    tagger: AutoTagger<J>,
    topics: TopicExtractor<J>,
}

impl<J: Judge> MemoryPipeline<J> {
    pub fn new(
        store: Arc<BoxVectorMemoryStore>,
        embedder: Arc<BoxEmbedder>,
        judge: Arc<J>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(judge.clone(), config.clone()),
            decider: ContinuityDecider::new(store.clone(), embedder.clone(), config.clone()),
            retrieval: RetrievalEngine::new(store.clone(), embedder.clone(), config.clone()),
            gate: WriteGate::new(judge.clone(), config.clone()),
            tagger: AutoTagger::new(judge.clone(), config.clone()),
            topics: TopicExtractor::new(judge, config.clone()),
            store,
            embedder,
            config,
        }
    }

    pub fn store(&self) -> &Arc<BoxVectorMemoryStore> {
        &self.store
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn classifier(&self) -> &IntentClassifier<J> {
        &self.classifier
    }

    pub fn decider(&self) -> &ContinuityDecider {
        &self.decider
    }

    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    pub fn write_gate(&self) -> &WriteGate<J> {
        &self.gate
    }

    /// Classify, check continuity, retrieve and build the LLM prompt.
    #[tracing::instrument(name = "prepare_turn", skip_all, fields(prompt_len = prompt.len()))]
    pub async fn prepare(&self, prompt: &str) -> PreparedTurn {
        let config = self.config.current();
        let intent = self.classifier.classify(prompt).await;
        let embedding = embed_one(&self.embedder, prompt, config.pipeline.call_timeout()).await;
        let topic_continued = self.decider.decide(&embedding).await;

        let retrieval = plan_retrieval(intent, topic_continued, config.retrieval.top_k);
        let candidates = match &retrieval {
            Some(options) => {
                self.retrieval
                    .retrieve_embedded(prompt, &embedding, options.k, options.mode)
                    .await
            }
            None => Vec::new(),
        };
        let context = retrieval
            .as_ref()
            .and_then(|options| render(&candidates, options));

        tracing::debug!(
            %intent,
            topic_continued,
            candidates = candidates.len(),
            has_context = context.is_some(),
            "Turn prepared"
        );

        PreparedTurn {
            prompt: prompt.to_string(),
            intent,
            topic_continued,
            augmented_prompt: augment_prompt(prompt, context.as_deref()),
            embedding,
            retrieval,
            candidates,
            context,
        }
    }

    /// Persist the turn's prompt if the write gate accepts it.
    ///
    /// The stored text is the user's own utterance, never the answer.
    /// `source` records which provider and model answered it.
    #[tracing::instrument(name = "commit_turn", skip_all, fields(intent = %turn.intent))]
    pub async fn commit(&self, turn: &PreparedTurn, source: &AnswerSource) -> CommitOutcome {
        if let WriteDecision::Reject(reason) = self.gate.evaluate(&turn.prompt, turn.intent).await {
            tracing::debug!(%reason, "Not storing prompt");
            return CommitOutcome::Skipped {
                reason: SkipReason::Rejected { reason },
            };
        }
        if turn.embedding.is_empty() {
            tracing::warn!("Accepted prompt has no embedding; not storing");
            return CommitOutcome::Skipped {
                reason: SkipReason::NoEmbedding,
            };
        }

        let tag = self.tagger.tag(&turn.prompt).await;
        let topic = self.topics.extract(&turn.prompt).await;
        let record = MemoryRecord {
            id: Uuid::now_v7(),
            text: turn.prompt.trim().to_string(),
            embedding: turn.embedding.clone(),
            metadata: MemoryMetadata {
                timestamp: Utc::now(),
                tag,
                intent: turn.intent,
                user_prompt: turn.prompt.clone(),
                topic_continued: turn.topic_continued,
                schema_version: SCHEMA_VERSION,
                embedding_model: self.embedder.model_name().to_string(),
                topic,
                provider: source.provider.clone(),
                model: source.model.clone(),
                access_count: 0,
                last_accessed_at: None,
            },
        };

        match self.store.insert(&record).await {
            Ok(()) => {
                tracing::info!(memory_id = %record.id, %tag, "Stored memory");
                CommitOutcome::Stored {
                    memory: StoredMemory::from(&record),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to store memory");
                CommitOutcome::Skipped {
                    reason: SkipReason::StoreFailed {
                        error: e.to_string(),
                    },
                }
            }
        }
    }

    /// prepare, answer with `provider`, commit.
    pub async fn run_turn(&self, prompt: &str, provider: &BoxLlmProvider) -> TurnOutcome {
        let turn = self.prepare(prompt).await;
        let timeout = self.config.current().pipeline.call_timeout();
        let answer = complete_text(provider, &turn.augmented_prompt, timeout).await;
        let commit = self.commit(&turn, &AnswerSource::of(provider)).await;
        TurnOutcome {
            turn,
            answer,
            commit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::complete::COMPLETION_FAILED;
    use crate::memory::in_memory::InMemoryVectorStore;
    use crate::testing::{EchoProvider, FailingStore, FixedEmbedder, ScriptedJudge};

    const LUNA: &str = "My cat is named Luna.";
    const LUNA_QUESTION: &str = "What is my cat's name?";

    fn embedder() -> FixedEmbedder {
        FixedEmbedder::new(3)
            .with(LUNA, [1.0, 0.0, 0.0])
            .with(LUNA_QUESTION, [0.9, 0.15, 0.0])
            .with("I moved to Bergen last year.", [0.0, 0.0, 1.0])
            .with("Remember what I said about Luna", [0.8, 0.2, 0.1])
    }

    fn judge() -> ScriptedJudge {
        ScriptedJudge::new()
            .on("Classify", "fact")
            .on("Assign one tag", "fact")
            .on("standalone", "true")
            .on("main topic", "pets")
    }

    fn source() -> AnswerSource {
        AnswerSource::new("echo", "echo-1")
    }

    fn pipeline_with(store: BoxVectorMemoryStore) -> MemoryPipeline<ScriptedJudge> {
        MemoryPipeline::new(
            Arc::new(store),
            Arc::new(BoxEmbedder::new(embedder())),
            Arc::new(judge()),
            ConfigHandle::default(),
        )
    }

    fn pipeline() -> MemoryPipeline<ScriptedJudge> {
        pipeline_with(BoxVectorMemoryStore::new(InMemoryVectorStore::new(3)))
    }

    #[test]
    fn test_augment_prompt() {
        assert_eq!(augment_prompt("Hi there", None), "Hi there");
        assert_eq!(
            augment_prompt("What is it?", Some("a fact")),
            "Context:\na fact\n\nUser: What is it?"
        );
    }

    #[test]
    fn test_plan_retrieval() {
        let query = plan_retrieval(Intent::Query, false, 5).unwrap();
        assert_eq!(query.mode, RetrievalMode::Global);
        assert!(query.plain);

        let meta = plan_retrieval(Intent::Meta, false, 5).unwrap();
        assert!(meta.include_meta);
        assert!(!meta.plain);

        assert_eq!(
            plan_retrieval(Intent::Fact, true, 3).unwrap().mode,
            RetrievalMode::Continuity
        );
        assert!(plan_retrieval(Intent::Fact, false, 3).is_none());
    }

    #[tokio::test]
    async fn test_luna_end_to_end() {
        let p = pipeline();

        let fact = p.prepare(LUNA).await;
        assert_eq!(fact.intent, Intent::Fact);
        assert!(fact.context.is_none());
        assert_eq!(fact.augmented_prompt, LUNA);
        let stored = p.commit(&fact, &source()).await;
        assert!(stored.is_stored());

        let question = p.prepare(LUNA_QUESTION).await;
        assert_eq!(question.intent, Intent::Query);
        assert_eq!(question.context.as_deref(), Some(LUNA));
        assert_eq!(
            question.augmented_prompt,
            format!("Context:\n{LUNA}\n\nUser: {LUNA_QUESTION}")
        );
        let skipped = p.commit(&question, &source()).await;
        assert!(matches!(
            skipped,
            CommitOutcome::Skipped {
                reason: SkipReason::Rejected {
                    reason: RejectReason::NotAFact(Intent::Query)
                }
            }
        ));

        assert_eq!(p.store().count().await.unwrap(), 1);
        let listed = p.store().peek(5).await.unwrap();
        assert_eq!(listed[0].text, LUNA);
        assert_eq!(listed[0].metadata.embedding_model, "fixed-test");
        assert_eq!(listed[0].metadata.topic, "pets");
        assert_eq!(listed[0].metadata.provider, "echo");
        assert_eq!(listed[0].metadata.model, "echo-1");
    }

    #[tokio::test]
    async fn test_meta_prompt_gets_annotated_context() {
        let p = pipeline();
        let fact = p.prepare(LUNA).await;
        p.commit(&fact, &source()).await;

        let meta = p.prepare("Remember what I said about Luna").await;
        assert_eq!(meta.intent, Intent::Meta);
        let context = meta.context.as_deref().unwrap();
        assert!(context.contains("stored: "));
        assert!(context.contains(&format!("prompt: \"{LUNA}\"")));
        assert!(!p.commit(&meta, &source()).await.is_stored());

        // Unknown to the embedder: no vector, so no context.
        let unknown = p.prepare("Remember the other thing I said").await;
        assert_eq!(unknown.intent, Intent::Meta);
        assert!(unknown.context.is_none());
    }

    #[tokio::test]
    async fn test_off_topic_fact_gets_no_context() {
        let p = pipeline();
        let fact = p.prepare(LUNA).await;
        p.commit(&fact, &source()).await;

        let moved = p.prepare("I moved to Bergen last year.").await;
        assert_eq!(moved.intent, Intent::Fact);
        assert!(!moved.topic_continued);
        assert!(moved.retrieval.is_none());
        assert!(p.commit(&moved, &source()).await.is_stored());
        assert_eq!(p.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_not_raised() {
        let p = pipeline_with(BoxVectorMemoryStore::new(FailingStore));
        let fact = p.prepare(LUNA).await;
        assert!(fact.context.is_none());
        assert!(matches!(
            p.commit(&fact, &source()).await,
            CommitOutcome::Skipped {
                reason: SkipReason::StoreFailed { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_unembeddable_fact_is_not_stored() {
        let p = pipeline();
        let turn = p.prepare("My dog is called Rex and he is old").await;
        assert!(matches!(
            p.commit(&turn, &source()).await,
            CommitOutcome::Skipped {
                reason: SkipReason::NoEmbedding
            }
        ));
    }

    #[tokio::test]
    async fn test_run_turn_answers_from_augmented_prompt() {
        let p = pipeline();
        let provider = BoxLlmProvider::new(EchoProvider::ok());
        let first = p.run_turn(LUNA, &provider).await;
        assert_eq!(first.answer, format!("echo: {LUNA}"));
        let CommitOutcome::Stored { memory } = &first.commit else {
            panic!("expected the fact to be stored");
        };
        assert_eq!(memory.metadata.provider, "echo");
        assert_eq!(memory.metadata.model, "echo-1");
        assert_eq!(memory.metadata.topic, "pets");

        let second = p.run_turn(LUNA_QUESTION, &provider).await;
        assert!(second.answer.starts_with("echo: Context:\nMy cat is named Luna."));

        let failing = BoxLlmProvider::new(EchoProvider::failing());
        let third = p.run_turn(LUNA_QUESTION, &failing).await;
        assert_eq!(third.answer, COMPLETION_FAILED);
    }
}
