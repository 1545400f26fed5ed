//! Topic-continuity detection: should this prompt pull in memory at all?

use std::sync::Arc;

use serde::Serialize;

use crate::config::ConfigHandle;
use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::box_vector::BoxVectorMemoryStore;
use crate::memory::embed::embed_one;
use crate::memory::similarity::{cosine_similarity, mean, std_dev};

/// Rolling similarity statistic over the continuity sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContinuityStats {
    /// Mean similarity to the recent records.
    pub mean: f32,
    /// Population standard deviation of those similarities.
    pub std_dev: f32,
    /// `max(base, mean - std_factor * std_dev)`.
    pub threshold: f32,
    /// Number of similarities the statistic was computed over.
    pub samples: usize,
}

impl ContinuityStats {
    /// Compute the statistic, `None` when there is nothing to compare against.
    pub fn from_similarities(similarities: &[f32], base: f32, std_factor: f32) -> Option<Self> {
        let mu = mean(similarities)?;
        let sigma = std_dev(similarities)?;
        Some(Self {
            mean: mu,
            std_dev: sigma,
            threshold: base.max(mu - std_factor * sigma),
            samples: similarities.len(),
        })
    }

    pub fn is_continued(&self) -> bool {
        self.mean >= self.threshold
    }
}

/// Decides whether retrieval should run, from the similarity of the prompt
/// to the most recently stored records.
///
/// Fails closed: no embedding, no history, or a store error all mean
/// "do not retrieve".
pub struct ContinuityDecider {
    store: Arc<BoxVectorMemoryStore>,
    embedder: Arc<BoxEmbedder>,
    config: ConfigHandle,
}

impl ContinuityDecider {
    pub fn new(
        store: Arc<BoxVectorMemoryStore>,
        embedder: Arc<BoxEmbedder>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Embed `prompt` and decide.
    pub async fn should_retrieve(&self, prompt: &str) -> bool {
        let timeout = self.config.current().pipeline.call_timeout();
        let embedding = embed_one(&self.embedder, prompt, timeout).await;
        self.decide(&embedding).await
    }

    /// Decide for an already-embedded prompt.
    #[tracing::instrument(name = "continuity_decide", skip_all, fields(dim = embedding.len()))]
    pub async fn decide(&self, embedding: &[f32]) -> bool {
        self.stats(embedding)
            .await
            .is_some_and(|stats| stats.is_continued())
    }

    /// The statistic behind [`ContinuityDecider::decide`], `None` when there
    /// is no signal.
    pub async fn stats(&self, embedding: &[f32]) -> Option<ContinuityStats> {
        if embedding.is_empty() {
            tracing::debug!("No prompt embedding; not retrieving");
            return None;
        }

        let config = self.config.current();
        let decider = &config.context_decider;

        let recent = match self.store.get_recent(decider.window).await {
            Ok(recent) => recent,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load recent embeddings; not retrieving");
                return None;
            }
        };

        // Samples of another dimension carry no signal.
        let similarities: Vec<f32> = recent
            .iter()
            .filter(|sample| sample.len() == embedding.len())
            .map(|sample| cosine_similarity(embedding, sample))
            .collect();

        let stats = ContinuityStats::from_similarities(
            &similarities,
            decider.continuity_base,
            decider.continuity_std_factor,
        );
        match &stats {
            Some(s) => tracing::debug!(
                avg_sim = s.mean,
                std_dev = s.std_dev,
                threshold = s.threshold,
                samples = s.samples,
                continued = s.is_continued(),
                "Continuity evaluated"
            ),
            None => tracing::debug!("No comparable history; not retrieving"),
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::in_memory::InMemoryVectorStore;
    use crate::memory::vector::VectorMemoryStore;
    use crate::testing::{FailingStore, FixedEmbedder, record};
    use cam_types::memory::Intent;

    fn decider_with(store: BoxVectorMemoryStore, embedder: FixedEmbedder) -> ContinuityDecider {
        ContinuityDecider::new(
            Arc::new(store),
            Arc::new(BoxEmbedder::new(embedder)),
            ConfigHandle::default(),
        )
    }

    #[test]
    fn test_zero_spread_collapses_to_base() {
        let stats = ContinuityStats::from_similarities(&[0.9, 0.9, 0.9], 0.4, 0.15).unwrap();
        assert!(stats.std_dev.abs() < 1e-6);
        assert!((stats.threshold - 0.9).abs() < 1e-5);
        assert!(stats.is_continued());
    }

    #[test]
    fn test_threshold_never_below_base() {
        let stats = ContinuityStats::from_similarities(&[0.1, 0.3], 0.45, 0.15).unwrap();
        assert!((stats.threshold - 0.45).abs() < 1e-6);
        assert!(!stats.is_continued());
        assert!(ContinuityStats::from_similarities(&[], 0.45, 0.15).is_none());
    }

    #[tokio::test]
    async fn test_no_history_never_retrieves() {
        let decider = decider_with(
            BoxVectorMemoryStore::new(InMemoryVectorStore::new(2)),
            FixedEmbedder::new(2).with("anything at all", [1.0, 0.0]),
        );
        assert!(!decider.should_retrieve("anything at all").await);
    }

    #[tokio::test]
    async fn test_similar_history_retrieves() {
        let store = InMemoryVectorStore::new(2);
        for text in ["a", "b", "c"] {
            store
                .insert(&record(text, vec![1.0, 0.05], Intent::Fact))
                .await
                .unwrap();
        }
        let decider = decider_with(
            BoxVectorMemoryStore::new(store),
            FixedEmbedder::new(2).with("more about my cat", [1.0, 0.0]),
        );
        assert!(decider.should_retrieve("more about my cat").await);
    }

    #[tokio::test]
    async fn test_topic_change_does_not_retrieve() {
        let store = InMemoryVectorStore::new(2);
        store
            .insert(&record("cats", vec![1.0, 0.0], Intent::Fact))
            .await
            .unwrap();
        let decider = decider_with(
            BoxVectorMemoryStore::new(store),
            FixedEmbedder::new(2).with("tax returns", [0.0, 1.0]),
        );
        assert!(!decider.should_retrieve("tax returns").await);
    }

    #[tokio::test]
    async fn test_partial_window_uses_available_samples() {
        let store = InMemoryVectorStore::new(2);
        store
            .insert(&record("only one", vec![1.0, 0.0], Intent::Fact))
            .await
            .unwrap();
        let decider = decider_with(BoxVectorMemoryStore::new(store), FixedEmbedder::new(2));
        let stats = decider.stats(&[1.0, 0.0]).await.unwrap();
        assert_eq!(stats.samples, 1);
        assert!(stats.is_continued());
    }

    #[tokio::test]
    async fn test_failures_fail_closed() {
        let decider = decider_with(
            BoxVectorMemoryStore::new(FailingStore),
            FixedEmbedder::new(2).with("hello again", [1.0, 0.0]),
        );
        assert!(!decider.should_retrieve("hello again").await);
        // Unknown text: the embedder errors and the prompt has no vector.
        assert!(!decider.should_retrieve("never seen").await);
        assert!(!decider.decide(&[]).await);
    }

    #[tokio::test]
    async fn test_mismatched_dimensions_are_no_signal() {
        let store = InMemoryVectorStore::new(3);
        store
            .insert(&record("3d", vec![1.0, 0.0, 0.0], Intent::Fact))
            .await
            .unwrap();
        let decider = decider_with(BoxVectorMemoryStore::new(store), FixedEmbedder::new(2));
        assert!(decider.stats(&[1.0, 0.0]).await.is_none());
    }
}
