//! Local embedding generation with fastembed (ONNX runtime).
//!
//! Runs BGE-small-en-v1.5 in-process. Inference is CPU-bound, so each call
//! runs on the blocking pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use cam_core::memory::embedder::Embedder;
use cam_types::error::RepositoryError;

use super::schema::EMBEDDING_DIMENSION;

/// Name recorded in `embedding_model` for every vector this embedder produces.
pub const MODEL_NAME: &str = "bge-small-en-v1.5";

/// [`Embedder`] backed by a local fastembed model.
pub struct FastEmbedEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedEmbedder {
    /// Load the model, downloading it into `cache_dir` on first use.
    pub fn new(cache_dir: PathBuf) -> Result<Self, RepositoryError> {
        let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| RepositoryError::Embedding(format!("Failed to load model: {e}")))?;

        tracing::info!(model = MODEL_NAME, "Embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

impl Embedder for FastEmbedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap_or_else(|e| e.into_inner());
            model
                .embed(texts, None)
                .map_err(|e| RepositoryError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| RepositoryError::Embedding(format!("Embedding task failed: {e}")))?
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}
