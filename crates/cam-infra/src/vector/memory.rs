//! LanceDB-backed memory store.
//!
//! Implements `VectorMemoryStore` from `cam-core` over a single `memories`
//! table. Vectors are searched with cosine distance; the `intent` column
//! backs the continuity-mode filter. Timestamps are RFC 3339 strings, so
//! recency ordering happens after the rows are read.

use std::sync::Arc;

use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Int32Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use uuid::Uuid;

use cam_core::memory::vector::VectorMemoryStore;
use cam_types::error::RepositoryError;
use cam_types::memory::{
    Intent, MemoryFilter, MemoryMetadata, MemoryRecord, MemoryTag, RetrievalCandidate,
    StoredMemory,
};

use super::lance::LanceVectorStore;
use super::schema::memory_record_schema;

/// Name of the LanceDB table holding memory records.
pub const MEMORY_TABLE: &str = "memories";

/// Columns read for the continuity window.
const RECENT_COLUMNS: &[&str] = &["timestamp", "vector"];

/// LanceDB-backed store for [`MemoryRecord`]s of one embedding width.
pub struct LanceMemoryStore {
    store: LanceVectorStore,
    dimension: usize,
    schema: Arc<Schema>,
}

impl LanceMemoryStore {
    /// Open the `memories` table for vectors of width `dimension`.
    ///
    /// An existing table built for a different width, or with a different
    /// set of columns, is dropped and recreated empty.
    pub async fn open(store: LanceVectorStore, dimension: usize) -> Result<Self, RepositoryError> {
        let width = i32::try_from(dimension)
            .map_err(|_| RepositoryError::Query(format!("Unsupported dimension {dimension}")))?;
        let schema = Arc::new(memory_record_schema(width));

        let inspect =
            |e: lancedb::Error| RepositoryError::Query(format!("Failed to inspect memory table: {e}"));
        let other_width = store
            .vector_width(MEMORY_TABLE)
            .await
            .map_err(inspect)?
            .filter(|found| *found != dimension);
        let other_layout = store
            .column_names(MEMORY_TABLE)
            .await
            .map_err(inspect)?
            .is_some_and(|names| {
                !names
                    .iter()
                    .map(String::as_str)
                    .eq(schema.fields().iter().map(|f| f.name().as_str()))
            });

        if let Some(found) = other_width {
            tracing::warn!(
                expected = dimension,
                found,
                "Memory table built for another embedding width, resetting"
            );
        } else if other_layout {
            tracing::warn!("Memory table has an older column layout, resetting");
        }
        if other_width.is_some() || other_layout {
            store
                .drop_table(MEMORY_TABLE)
                .await
                .map_err(|e| RepositoryError::Query(format!("Failed to drop memory table: {e}")))?;
        }

        store
            .ensure_table(MEMORY_TABLE, schema.clone())
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to ensure memory table: {e}")))?;

        Ok(Self {
            store,
            dimension,
            schema,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn table(&self) -> Result<lancedb::Table, RepositoryError> {
        self.store
            .ensure_table(MEMORY_TABLE, self.schema.clone())
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to open memory table: {e}")))
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), RepositoryError> {
        if embedding.len() != self.dimension {
            return Err(RepositoryError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    fn build_record_batch(&self, record: &MemoryRecord) -> Result<RecordBatch, RepositoryError> {
        let meta = &record.metadata;
        let last_accessed: StringArray = match meta.last_accessed_at {
            Some(ts) => StringArray::from(vec![Some(ts.to_rfc3339())]),
            None => StringArray::from(vec![None::<String>]),
        };

        let values = Float32Array::from(record.embedding.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array =
            FixedSizeListArray::try_new(field, self.dimension as i32, Arc::new(values), None)
                .map_err(|e| RepositoryError::Query(format!("Failed to build vector column: {e}")))?;

        RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![record.id.to_string()])),
                Arc::new(StringArray::from(vec![record.text.clone()])),
                Arc::new(StringArray::from(vec![meta.timestamp.to_rfc3339()])),
                Arc::new(StringArray::from(vec![meta.tag.to_string()])),
                Arc::new(StringArray::from(vec![meta.intent.to_string()])),
                Arc::new(StringArray::from(vec![meta.user_prompt.clone()])),
                Arc::new(BooleanArray::from(vec![meta.topic_continued])),
                Arc::new(Int32Array::from(vec![meta.schema_version as i32])),
                Arc::new(StringArray::from(vec![meta.embedding_model.clone()])),
                Arc::new(StringArray::from(vec![meta.topic.clone()])),
                Arc::new(StringArray::from(vec![meta.provider.clone()])),
                Arc::new(StringArray::from(vec![meta.model.clone()])),
                Arc::new(Int32Array::from(vec![meta.access_count as i32])),
                Arc::new(last_accessed),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
    }

    /// Run a plain (non-vector) scan, optionally filtered and projected.
    async fn scan(
        &self,
        filter: Option<String>,
        columns: Option<&[&str]>,
    ) -> Result<Vec<RecordBatch>, RepositoryError> {
        let table = self.table().await?;
        let mut query = table.query();
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }
        if let Some(columns) = columns {
            query = query.select(Select::columns(columns));
        }
        let results = query
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Scan failed: {e}")))?;
        results
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect scan results: {e}")))
    }
}

/// SQL predicate equivalent of a [`MemoryFilter`].
fn filter_predicate(filter: &MemoryFilter) -> Option<String> {
    filter.intent.map(|intent| format!("intent = '{intent}'"))
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, RepositoryError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| RepositoryError::Query(format!("Column '{name}' missing or mistyped")))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Rebuild stored memories from a batch. The vector column is not read.
fn batch_to_memories(batch: &RecordBatch) -> Result<Vec<StoredMemory>, RepositoryError> {
    if batch.num_rows() == 0 {
        return Ok(vec![]);
    }

    let id_col = column::<StringArray>(batch, "id")?;
    let text_col = column::<StringArray>(batch, "text")?;
    let timestamp_col = column::<StringArray>(batch, "timestamp")?;
    let tag_col = column::<StringArray>(batch, "tag")?;
    let intent_col = column::<StringArray>(batch, "intent")?;
    let prompt_col = column::<StringArray>(batch, "user_prompt")?;
    let continued_col = column::<BooleanArray>(batch, "topic_continued")?;
    let version_col = column::<Int32Array>(batch, "schema_version")?;
    let embedding_model_col = column::<StringArray>(batch, "embedding_model")?;
    let topic_col = column::<StringArray>(batch, "topic")?;
    let provider_col = column::<StringArray>(batch, "provider")?;
    let model_col = column::<StringArray>(batch, "model")?;
    let access_col = column::<Int32Array>(batch, "access_count")?;
    let last_accessed_col = column::<StringArray>(batch, "last_accessed_at")?;

    let mut memories = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let last_accessed_at = if last_accessed_col.is_null(i) {
            None
        } else {
            parse_timestamp(last_accessed_col.value(i))
        };

        memories.push(StoredMemory {
            id: Uuid::parse_str(id_col.value(i)).unwrap_or_else(|_| Uuid::nil()),
            text: text_col.value(i).to_string(),
            metadata: MemoryMetadata {
                timestamp: parse_timestamp(timestamp_col.value(i)).unwrap_or_default(),
                tag: tag_col.value(i).parse().unwrap_or(MemoryTag::None),
                intent: intent_col.value(i).parse().unwrap_or(Intent::Fact),
                user_prompt: prompt_col.value(i).to_string(),
                topic_continued: continued_col.value(i),
                schema_version: version_col.value(i).max(0) as u32,
                embedding_model: embedding_model_col.value(i).to_string(),
                topic: topic_col.value(i).to_string(),
                provider: provider_col.value(i).to_string(),
                model: model_col.value(i).to_string(),
                access_count: access_col.value(i).max(0) as u32,
                last_accessed_at,
            },
        });
    }
    Ok(memories)
}

fn batch_to_vectors(batch: &RecordBatch) -> Result<Vec<Vec<f32>>, RepositoryError> {
    let list = column::<FixedSizeListArray>(batch, "vector")?;
    (0..list.len())
        .map(|i| {
            let values = list.value(i);
            values
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(|v| v.values().to_vec())
                .ok_or_else(|| RepositoryError::Query("Vector values are not Float32".to_string()))
        })
        .collect()
}

impl VectorMemoryStore for LanceMemoryStore {
    async fn insert(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        self.check_dimension(&record.embedding)?;
        let table = self.table().await?;

        let existing = table
            .count_rows(Some(format!("id = '{}'", record.id)))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to check for id: {e}")))?;
        if existing > 0 {
            return Err(RepositoryError::Conflict(format!(
                "memory {} already exists",
                record.id
            )));
        }

        let batch = self.build_record_batch(record)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add memory: {e}")))?;

        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MemoryFilter>,
    ) -> Result<Vec<RetrievalCandidate>, RepositoryError> {
        self.check_dimension(embedding)?;
        if k == 0 {
            return Ok(vec![]);
        }

        let table = self.table().await?;
        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        if rows == 0 {
            return Ok(vec![]);
        }

        let mut search = table
            .vector_search(embedding)
            .map_err(|e| RepositoryError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);
        if let Some(predicate) = filter.and_then(filter_predicate) {
            search = search.only_if(predicate);
        }

        let results = search
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector search failed: {e}")))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut candidates = Vec::new();
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            // Added by LanceDB to every vector search result.
            let distances = column::<Float32Array>(batch, "_distance")?;
            for (i, memory) in batch_to_memories(batch)?.into_iter().enumerate() {
                candidates.push(RetrievalCandidate {
                    id: memory.id,
                    text: memory.text,
                    distance: distances.value(i),
                    metadata: memory.metadata,
                });
            }
        }

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn get_recent(&self, n: usize) -> Result<Vec<Vec<f32>>, RepositoryError> {
        if n == 0 {
            return Ok(vec![]);
        }

        let mut rows: Vec<(DateTime<Utc>, Vec<f32>)> = Vec::new();
        for batch in &self.scan(None, Some(RECENT_COLUMNS)).await? {
            let timestamps = column::<StringArray>(batch, "timestamp")?;
            for (i, vector) in batch_to_vectors(batch)?.into_iter().enumerate() {
                let ts = parse_timestamp(timestamps.value(i)).unwrap_or_default();
                rows.push((ts, vector));
            }
        }

        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().take(n).map(|(_, vector)| vector).collect())
    }

    async fn peek(&self, n: usize) -> Result<Vec<StoredMemory>, RepositoryError> {
        let mut memories = Vec::new();
        for batch in &self.scan(None, None).await? {
            memories.extend(batch_to_memories(batch)?);
        }
        memories.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
        memories.truncate(n);
        Ok(memories)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let table = self.table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        Ok(count as u64)
    }

    async fn reinforce(&self, ids: &[Uuid]) -> Result<(), RepositoryError> {
        if ids.is_empty() {
            return Ok(());
        }

        let id_list = ids
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let now = Utc::now().to_rfc3339();

        self.table()
            .await?
            .update()
            .only_if(format!("id IN ({id_list})"))
            .column("access_count", "access_count + 1")
            .column("last_accessed_at", format!("'{now}'"))
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to reinforce memories: {e}")))?;

        Ok(())
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let count = self.count().await?;

        self.store
            .drop_table(MEMORY_TABLE)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to drop memory table: {e}")))?;
        // Recreate right away so readers never see a missing table.
        self.table().await?;

        Ok(count)
    }
}
