//! Vector database infrastructure for memory embeddings.
//!
//! Provides LanceDB connection management, the `memories` table store, and
//! fastembed-based local embedding generation. Arrow schemas define the
//! table layout.

pub mod embedder;
pub mod lance;
pub mod memory;
pub mod schema;
