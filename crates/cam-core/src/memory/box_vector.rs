//! BoxVectorMemoryStore -- object-safe dynamic dispatch wrapper for VectorMemoryStore.
//!
//! Same blanket-impl shape as `BoxEmbedder`:
//! 1. `VectorMemoryStoreDyn` mirrors the trait with boxed futures
//! 2. a blanket impl covers every `T: VectorMemoryStore`
//! 3. `BoxVectorMemoryStore` wraps `Box<dyn VectorMemoryStoreDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use cam_types::error::RepositoryError;
use cam_types::memory::{MemoryFilter, MemoryRecord, RetrievalCandidate, StoredMemory};
use uuid::Uuid;

use super::vector::VectorMemoryStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`VectorMemoryStore`] with boxed futures.
pub trait VectorMemoryStoreDyn: Send + Sync {
    fn insert_boxed<'a>(&'a self, record: &'a MemoryRecord) -> BoxFuture<'a, ()>;

    fn query_boxed<'a>(
        &'a self,
        embedding: &'a [f32],
        k: usize,
        filter: Option<&'a MemoryFilter>,
    ) -> BoxFuture<'a, Vec<RetrievalCandidate>>;

    fn get_recent_boxed(&self, n: usize) -> BoxFuture<'_, Vec<Vec<f32>>>;

    fn peek_boxed(&self, n: usize) -> BoxFuture<'_, Vec<StoredMemory>>;

    fn count_boxed(&self) -> BoxFuture<'_, u64>;

    fn reinforce_boxed<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, ()>;

    fn delete_all_boxed(&self) -> BoxFuture<'_, u64>;
}

impl<T: VectorMemoryStore> VectorMemoryStoreDyn for T {
    fn insert_boxed<'a>(&'a self, record: &'a MemoryRecord) -> BoxFuture<'a, ()> {
        Box::pin(self.insert(record))
    }

    fn query_boxed<'a>(
        &'a self,
        embedding: &'a [f32],
        k: usize,
        filter: Option<&'a MemoryFilter>,
    ) -> BoxFuture<'a, Vec<RetrievalCandidate>> {
        Box::pin(self.query(embedding, k, filter))
    }

    fn get_recent_boxed(&self, n: usize) -> BoxFuture<'_, Vec<Vec<f32>>> {
        Box::pin(self.get_recent(n))
    }

    fn peek_boxed(&self, n: usize) -> BoxFuture<'_, Vec<StoredMemory>> {
        Box::pin(self.peek(n))
    }

    fn count_boxed(&self) -> BoxFuture<'_, u64> {
        Box::pin(self.count())
    }

    fn reinforce_boxed<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, ()> {
        Box::pin(self.reinforce(ids))
    }

    fn delete_all_boxed(&self) -> BoxFuture<'_, u64> {
        Box::pin(self.delete_all())
    }
}

/// Type-erased vector memory store.
///
/// The entry point opens one backend (LanceDB on disk, or in-memory for
/// ephemeral runs) and hands the same `Arc<BoxVectorMemoryStore>` to every
/// component.
pub struct BoxVectorMemoryStore {
    inner: Box<dyn VectorMemoryStoreDyn + Send + Sync>,
}

impl BoxVectorMemoryStore {
    pub fn new<T: VectorMemoryStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }

    pub async fn insert(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        self.inner.insert_boxed(record).await
    }

    pub async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MemoryFilter>,
    ) -> Result<Vec<RetrievalCandidate>, RepositoryError> {
        self.inner.query_boxed(embedding, k, filter).await
    }

    pub async fn get_recent(&self, n: usize) -> Result<Vec<Vec<f32>>, RepositoryError> {
        self.inner.get_recent_boxed(n).await
    }

    pub async fn peek(&self, n: usize) -> Result<Vec<StoredMemory>, RepositoryError> {
        self.inner.peek_boxed(n).await
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        self.inner.count_boxed().await
    }

    pub async fn reinforce(&self, ids: &[Uuid]) -> Result<(), RepositoryError> {
        self.inner.reinforce_boxed(ids).await
    }

    pub async fn delete_all(&self) -> Result<u64, RepositoryError> {
        self.inner.delete_all_boxed().await
    }
}
