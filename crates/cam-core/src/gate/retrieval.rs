//! Adaptive-threshold retrieval, re-ranking and context formatting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cam_types::config::RetrievalConfig;
use cam_types::memory::{MemoryFilter, RetrievalCandidate, RetrievalMode};

use super::rerank::{PronounReranker, Reranker};
use crate::config::ConfigHandle;
use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::box_vector::BoxVectorMemoryStore;
use crate::memory::embed::embed_one;
use crate::memory::similarity::mean;

/// Separator between formatted candidates.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// How a retrieval should run and be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Candidates requested from the store.
    pub k: usize,
    pub mode: RetrievalMode,
    /// Render timestamp and source prompt instead of the distance.
    pub include_meta: bool,
    /// Render only the top candidate's raw text.
    pub plain: bool,
}

impl RetrievalOptions {
    pub fn new(k: usize, mode: RetrievalMode) -> Self {
        Self {
            k,
            mode,
            include_meta: false,
            plain: false,
        }
    }

    pub fn with_meta(mut self) -> Self {
        self.include_meta = true;
        self
    }

    pub fn plain(mut self) -> Self {
        self.plain = true;
        self
    }
}

/// The base distance threshold for a mode. Continuity is the stricter one.
pub fn base_threshold(config: &RetrievalConfig, mode: RetrievalMode) -> f32 {
    match mode {
        RetrievalMode::Continuity => config.continuity_max_distance,
        RetrievalMode::Global => config.max_distance,
    }
}

/// Relaxed threshold after nothing passed `base`: `min(mean + margin, cap)`.
///
/// Never below `base`. With no distances there is nothing to relax towards
/// and `base` is returned.
pub fn relax_threshold(distances: &[f32], base: f32, margin: f32, cap: f32) -> f32 {
    match mean(distances) {
        Some(mu) => (mu + margin).min(cap).max(base),
        None => base,
    }
}

/// Keep candidates within `base`; if none pass, relax once.
///
/// Input order is preserved. Returns an empty vector rather than anything
/// beyond the relaxed threshold.
pub fn apply_threshold(
    candidates: Vec<RetrievalCandidate>,
    base: f32,
    margin: f32,
    cap: f32,
) -> Vec<RetrievalCandidate> {
    if candidates.iter().any(|c| c.distance <= base) {
        return candidates.into_iter().filter(|c| c.distance <= base).collect();
    }

    let distances: Vec<f32> = candidates.iter().map(|c| c.distance).collect();
    let relaxed = relax_threshold(&distances, base, margin, cap);
    let kept: Vec<RetrievalCandidate> = candidates
        .into_iter()
        .filter(|c| c.distance <= relaxed)
        .collect();
    tracing::debug!(base, threshold = relaxed, kept = kept.len(), "Relaxed distance threshold");
    kept
}

/// One block per candidate, joined by [`CONTEXT_SEPARATOR`].
pub fn format_context(candidates: &[RetrievalCandidate], include_meta: bool) -> String {
    candidates
        .iter()
        .map(|c| {
            if include_meta {
                format!(
                    "[Memory | tag: {} | stored: {} | prompt: \"{}\"]\n{}",
                    c.metadata.tag,
                    c.metadata.timestamp.to_rfc3339(),
                    c.metadata.user_prompt,
                    c.text
                )
            } else {
                format!(
                    "[Memory | tag: {} | distance: {:.3}]\n{}",
                    c.metadata.tag, c.distance, c.text
                )
            }
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// The top candidate's raw text.
pub fn plain_context(candidates: &[RetrievalCandidate]) -> Option<String> {
    candidates.first().map(|c| c.text.clone())
}

/// Render candidates as a context block, `None` when there are none.
pub fn render(candidates: &[RetrievalCandidate], options: &RetrievalOptions) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    if options.plain {
        plain_context(candidates)
    } else {
        Some(format_context(candidates, options.include_meta))
    }
}

/// Queries the store with mode filters and adaptive thresholds.
///
/// Every operation is total: an embedding failure, a store error or an
/// empty store all yield no candidates.
pub struct RetrievalEngine {
    store: Arc<BoxVectorMemoryStore>,
    embedder: Arc<BoxEmbedder>,
    config: ConfigHandle,
    reranker: Box<dyn Reranker>,
}

impl RetrievalEngine {
    /// Engine with the default [`PronounReranker`].
    pub fn new(
        store: Arc<BoxVectorMemoryStore>,
        embedder: Arc<BoxEmbedder>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            reranker: Box::new(PronounReranker),
        }
    }

    pub fn with_reranker(mut self, reranker: impl Reranker + 'static) -> Self {
        self.reranker = Box::new(reranker);
        self
    }

    /// Embed `query` and retrieve.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        mode: RetrievalMode,
    ) -> Vec<RetrievalCandidate> {
        let timeout = self.config.current().pipeline.call_timeout();
        let embedding = embed_one(&self.embedder, query, timeout).await;
        self.retrieve_embedded(query, &embedding, k, mode).await
    }

    /// Retrieve for a query that is already embedded.
    #[tracing::instrument(name = "retrieve", skip(self, query, embedding))]
    pub async fn retrieve_embedded(
        &self,
        query: &str,
        embedding: &[f32],
        k: usize,
        mode: RetrievalMode,
    ) -> Vec<RetrievalCandidate> {
        if embedding.is_empty() || k == 0 {
            return Vec::new();
        }

        let config = self.config.current();
        let retrieval = &config.retrieval;
        let filter = MemoryFilter::for_mode(mode);

        let candidates = match self.store.query(embedding, k, filter.as_ref()).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Memory query failed; continuing without context");
                return Vec::new();
            }
        };
        let fetched = candidates.len();

        let base = base_threshold(retrieval, mode);
        let kept = apply_threshold(candidates, base, retrieval.relax_margin, retrieval.relax_cap);
        let ranked = self.reranker.rerank(query, kept);

        tracing::debug!(
            fetched,
            kept = ranked.len(),
            best_distance = ranked.first().map(|c| c.distance),
            "Retrieval complete"
        );

        if !ranked.is_empty() {
            let ids: Vec<_> = ranked.iter().map(|c| c.id).collect();
            if let Err(e) = self.store.reinforce(&ids).await {
                tracing::warn!(error = %e, "Failed to reinforce retrieved memories");
            }
        }
        ranked
    }

    /// Retrieve and render in one step.
    pub async fn context(&self, query: &str, options: &RetrievalOptions) -> Option<String> {
        let candidates = self.retrieve(query, options.k, options.mode).await;
        render(&candidates, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::rerank::DistanceOrder;
    use crate::memory::in_memory::InMemoryVectorStore;
    use crate::memory::vector::VectorMemoryStore;
    use crate::testing::{FailingStore, FixedEmbedder, candidate, record};
    use cam_types::memory::Intent;

    fn engine(store: BoxVectorMemoryStore, embedder: FixedEmbedder) -> RetrievalEngine {
        RetrievalEngine::new(
            Arc::new(store),
            Arc::new(BoxEmbedder::new(embedder)),
            ConfigHandle::default(),
        )
    }

    #[test]
    fn test_relax_threshold() {
        assert!((relax_threshold(&[0.62, 0.66], 0.6, 0.1, 0.8) - 0.74).abs() < 1e-5);
        assert!((relax_threshold(&[0.85, 0.95], 0.6, 0.1, 0.8) - 0.8).abs() < 1e-6);
        assert_eq!(relax_threshold(&[], 0.6, 0.1, 0.8), 0.6);
    }

    #[test]
    fn test_apply_threshold_prefers_base_pass() {
        let kept = apply_threshold(
            vec![candidate("close", 0.2), candidate("far", 0.7)],
            0.6,
            0.1,
            0.8,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "close");
    }

    #[test]
    fn test_relaxation_keeps_at_least_the_nearest() {
        let kept = apply_threshold(
            vec![candidate("nearest", 0.62), candidate("next", 0.68)],
            0.6,
            0.1,
            0.8,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].text, "nearest");
    }

    #[test]
    fn test_relaxation_capped_returns_nothing() {
        let kept = apply_threshold(
            vec![candidate("a", 0.85), candidate("b", 0.95)],
            0.6,
            0.1,
            0.8,
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn test_format_context() {
        let candidates = vec![candidate("first", 0.1234), candidate("second", 0.5)];
        let text = format_context(&candidates, false);
        assert_eq!(
            text,
            "[Memory | tag: fact | distance: 0.123]\nfirst\n---\n[Memory | tag: fact | distance: 0.500]\nsecond"
        );

        let with_meta = format_context(&candidates[..1], true);
        assert!(with_meta.starts_with("[Memory | tag: fact | stored: "));
        assert!(with_meta.contains("prompt: \"first\""));
        assert!(!with_meta.contains("distance"));
    }

    #[test]
    fn test_render_variants() {
        let options = RetrievalOptions::new(5, RetrievalMode::Global);
        assert_eq!(render(&[], &options), None);
        assert_eq!(render(&[], &options.plain()), None);

        let candidates = vec![candidate("top", 0.1), candidate("other", 0.2)];
        assert_eq!(render(&candidates, &options.plain()).as_deref(), Some("top"));
        assert!(render(&candidates, &options).unwrap().contains(CONTEXT_SEPARATOR));
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let e = engine(
            BoxVectorMemoryStore::new(InMemoryVectorStore::new(2)),
            FixedEmbedder::new(2).with("what is my name?", [1.0, 0.0]),
        );
        assert!(e.retrieve("what is my name?", 5, RetrievalMode::Global).await.is_empty());
    }

    #[tokio::test]
    async fn test_failures_return_nothing() {
        let e = engine(
            BoxVectorMemoryStore::new(FailingStore),
            FixedEmbedder::new(2).with("what is my name?", [1.0, 0.0]),
        );
        assert!(e.retrieve("what is my name?", 5, RetrievalMode::Global).await.is_empty());
        assert!(e.retrieve("unembeddable", 5, RetrievalMode::Global).await.is_empty());
    }

    #[tokio::test]
    async fn test_continuity_mode_only_sees_facts() {
        let store = InMemoryVectorStore::new(2);
        store
            .insert(&record("Where is Oslo?", vec![1.0, 0.0], Intent::Query))
            .await
            .unwrap();
        store
            .insert(&record("I live in Oslo.", vec![1.0, 0.1], Intent::Fact))
            .await
            .unwrap();
        let e = engine(
            BoxVectorMemoryStore::new(store),
            FixedEmbedder::new(2).with("Oslo weather today", [1.0, 0.0]),
        );

        let global = e.retrieve("Oslo weather today", 5, RetrievalMode::Global).await;
        assert_eq!(global.len(), 2);
        assert_eq!(global[0].text, "Where is Oslo?");

        let continuity = e
            .retrieve("Oslo weather today", 5, RetrievalMode::Continuity)
            .await;
        assert_eq!(continuity.len(), 1);
        assert_eq!(continuity[0].text, "I live in Oslo.");
    }

    #[tokio::test]
    async fn test_self_query_is_near_zero_and_reinforced() {
        let store = Arc::new(BoxVectorMemoryStore::new(InMemoryVectorStore::new(3)));
        let rec = record("My cat is named Luna.", vec![0.2, 0.9, 0.1], Intent::Fact);
        store.insert(&rec).await.unwrap();

        let e = RetrievalEngine::new(
            store.clone(),
            Arc::new(BoxEmbedder::new(
                FixedEmbedder::new(3).with("My cat is named Luna.", [0.2, 0.9, 0.1]),
            )),
            ConfigHandle::default(),
        );
        let hits = e
            .retrieve("My cat is named Luna.", 5, RetrievalMode::Global)
            .await;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].distance.abs() < 1e-5);

        let listed = store.peek(1).await.unwrap();
        assert_eq!(listed[0].metadata.access_count, 1);
    }

    #[tokio::test]
    async fn test_reranker_is_pluggable() {
        let store = Arc::new(BoxVectorMemoryStore::new(InMemoryVectorStore::new(2)));
        store
            .insert(&record("we talked about the weather", vec![1.0, 0.0], Intent::Fact))
            .await
            .unwrap();
        store
            .insert(&record("my neighbour is called Tom", vec![0.9, 0.3], Intent::Fact))
            .await
            .unwrap();
        let embedder = Arc::new(BoxEmbedder::new(
            FixedEmbedder::new(2).with("what does he do?", [1.0, 0.0]),
        ));

        let pronoun = RetrievalEngine::new(store.clone(), embedder.clone(), ConfigHandle::default());
        let hits = pronoun.retrieve("what does he do?", 5, RetrievalMode::Global).await;
        assert_eq!(hits[0].text, "my neighbour is called Tom");

        let plain = RetrievalEngine::new(store, embedder, ConfigHandle::default())
            .with_reranker(DistanceOrder);
        let hits = plain.retrieve("what does he do?", 5, RetrievalMode::Global).await;
        assert_eq!(hits[0].text, "we talked about the weather");
    }

    #[tokio::test]
    async fn test_context_renders_plain() {
        let store = InMemoryVectorStore::new(2);
        store
            .insert(&record("My cat is named Luna.", vec![1.0, 0.0], Intent::Fact))
            .await
            .unwrap();
        let e = engine(
            BoxVectorMemoryStore::new(store),
            FixedEmbedder::new(2).with("What is my cat's name?", [0.9, 0.1]),
        );
        let options = RetrievalOptions::new(5, RetrievalMode::Global).plain();
        assert_eq!(
            e.context("What is my cat's name?", &options).await.as_deref(),
            Some("My cat is named Luna.")
        );
    }
}
