//! Semantic memory ports and helpers.
//!
//! - `Embedder` / `BoxEmbedder`: text to vector
//! - `VectorMemoryStore` / `BoxVectorMemoryStore`: record persistence and search
//! - `InMemoryVectorStore`: brute-force store for ephemeral runs
//! - `similarity`: cosine and summary statistics

pub mod box_embedder;
pub mod box_vector;
pub mod embed;
pub mod embedder;
pub mod in_memory;
pub mod similarity;
pub mod vector;
