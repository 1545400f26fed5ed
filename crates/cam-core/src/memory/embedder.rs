//! Embedder trait for text-to-vector conversion.
//!
//! Every decision that compares prompts (continuity, retrieval, the stored
//! record itself) goes through this trait. Implementations (e.g. the local
//! fastembed model) live in cam-infra.

use cam_types::error::RepositoryError;

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Embedder: Send + Sync {
    /// Embed one or more texts into vectors.
    ///
    /// Returns one vector per input text, all of length [`Embedder::dimension`].
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, RepositoryError>> + Send;

    /// The model name recorded on every stored record (e.g. "bge-small-en-v1.5").
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
