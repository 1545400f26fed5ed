//! Single-text embedding with the pipeline's failure semantics.

use std::time::Duration;

use super::box_embedder::BoxEmbedder;

/// Embed one text, returning an empty vector on any failure.
///
/// Blank text, an embedder error, a timeout, an empty batch or a vector of
/// the wrong length all collapse to `vec![]`. Callers treat an empty vector
/// as "no signal" and take their conservative branch.
pub async fn embed_one(embedder: &BoxEmbedder, text: &str, timeout: Duration) -> Vec<f32> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let batch = [text.to_string()];
    match tokio::time::timeout(timeout, embedder.embed(&batch)).await {
        Ok(Ok(mut vectors)) => match vectors.pop() {
            Some(vector) if vector.len() == embedder.dimension() => vector,
            Some(vector) => {
                tracing::warn!(
                    expected = embedder.dimension(),
                    actual = vector.len(),
                    "Embedder returned a vector of unexpected length; ignoring it"
                );
                Vec::new()
            }
            None => Vec::new(),
        },
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Embedding failed; continuing without a vector");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Embedding timed out; continuing without a vector"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedEmbedder;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_embed_known_text() {
        let embedder = BoxEmbedder::new(FixedEmbedder::new(3).with("hello there", [1.0, 0.0, 0.0]));
        let vector = embed_one(&embedder, "  hello there ", TIMEOUT).await;
        assert_eq!(vector, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_blank_text_is_empty() {
        let embedder = BoxEmbedder::new(FixedEmbedder::new(3));
        assert!(embed_one(&embedder, "   ", TIMEOUT).await.is_empty());
    }

    #[tokio::test]
    async fn test_embedder_error_is_empty() {
        let embedder = BoxEmbedder::new(FixedEmbedder::new(3));
        assert!(embed_one(&embedder, "unknown text", TIMEOUT).await.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_length_is_empty() {
        let embedder = BoxEmbedder::new(FixedEmbedder::new(3).with("short", [1.0, 0.0]));
        assert!(embed_one(&embedder, "short", TIMEOUT).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_empty() {
        let embedder = BoxEmbedder::new(
            FixedEmbedder::new(3)
                .with("slow", [1.0, 0.0, 0.0])
                .with_delay(Duration::from_secs(5)),
        );
        assert!(embed_one(&embedder, "slow", TIMEOUT).await.is_empty());
    }
}
