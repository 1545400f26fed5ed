//! In-process vector store.
//!
//! Brute-force cosine search over a `Vec`. Backs ephemeral runs and the
//! tests; the on-disk LanceDB store lives in cam-infra.

use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use cam_types::error::RepositoryError;
use cam_types::memory::{MemoryFilter, MemoryRecord, RetrievalCandidate, StoredMemory};

use super::similarity::cosine_distance;
use super::vector::VectorMemoryStore;

/// A [`VectorMemoryStore`] held entirely in memory.
pub struct InMemoryVectorStore {
    dimension: usize,
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<MemoryRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<MemoryRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Records ordered newest first. Ties keep the later insert first.
    fn newest_first(&self, n: usize) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self.read().iter().rev().cloned().collect();
        records.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
        records.truncate(n);
        records
    }
}

impl VectorMemoryStore for InMemoryVectorStore {
    async fn insert(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        if record.embedding.len() != self.dimension {
            return Err(RepositoryError::DimensionMismatch {
                expected: self.dimension,
                actual: record.embedding.len(),
            });
        }
        let mut records = self.write();
        if records.iter().any(|r| r.id == record.id) {
            return Err(RepositoryError::Conflict(format!(
                "memory {} already exists",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MemoryFilter>,
    ) -> Result<Vec<RetrievalCandidate>, RepositoryError> {
        if embedding.len() != self.dimension {
            return Err(RepositoryError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let mut candidates: Vec<RetrievalCandidate> = self
            .read()
            .iter()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)))
            .map(|r| RetrievalCandidate {
                id: r.id,
                text: r.text.clone(),
                distance: cosine_distance(embedding, &r.embedding),
                metadata: r.metadata.clone(),
            })
            .collect();

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn get_recent(&self, n: usize) -> Result<Vec<Vec<f32>>, RepositoryError> {
        Ok(self
            .newest_first(n)
            .into_iter()
            .map(|r| r.embedding)
            .collect())
    }

    async fn peek(&self, n: usize) -> Result<Vec<StoredMemory>, RepositoryError> {
        Ok(self
            .newest_first(n)
            .iter()
            .map(StoredMemory::from)
            .collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.read().len() as u64)
    }

    async fn reinforce(&self, ids: &[Uuid]) -> Result<(), RepositoryError> {
        let now = Utc::now();
        for record in self.write().iter_mut().filter(|r| ids.contains(&r.id)) {
            record.metadata.access_count = record.metadata.access_count.saturating_add(1);
            record.metadata.last_accessed_at = Some(now);
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let mut records = self.write();
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }
}
