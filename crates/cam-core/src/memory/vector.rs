//! Vector memory store trait.
//!
//! Defines the interface for semantic vector search over memory records.
//! Implementations (LanceDB, in-memory) live in cam-infra and
//! [`super::in_memory`].

use cam_types::error::RepositoryError;
use cam_types::memory::{MemoryFilter, MemoryRecord, RetrievalCandidate, StoredMemory};
use uuid::Uuid;

/// Trait for vector-indexed memory storage with semantic search.
///
/// Distances are cosine distances: 0 = identical, larger = more dissimilar.
/// Individual operations are assumed atomic; nothing above this trait holds
/// a lock across a read and a following write.
pub trait VectorMemoryStore: Send + Sync {
    /// Persist a record. Rejects an embedding whose length differs from the
    /// store's dimension.
    fn insert(
        &self,
        record: &MemoryRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The `k` nearest records matching `filter`, nearest first.
    fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MemoryFilter>,
    ) -> impl std::future::Future<Output = Result<Vec<RetrievalCandidate>, RepositoryError>> + Send;

    /// Embeddings of the `n` most recently written records, newest first.
    fn get_recent(
        &self,
        n: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, RepositoryError>> + Send;

    /// The `n` most recently written records without their vectors, newest first.
    fn peek(
        &self,
        n: usize,
    ) -> impl std::future::Future<Output = Result<Vec<StoredMemory>, RepositoryError>> + Send;

    /// Count all records.
    fn count(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Bump `access_count` and `last_accessed_at` on the given records.
    fn reinforce(
        &self,
        ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete every record. Returns how many were removed.
    fn delete_all(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
