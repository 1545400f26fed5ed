//! Arrow schema for the LanceDB `memories` table.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// BGESmallENV15 embedding dimension.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Schema of the `memories` table for vectors of width `dimension`.
///
/// Timestamps are RFC 3339 strings; `tag` and `intent` use their lowercase
/// display form (`NONE` for the empty tag).
pub fn memory_record_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("tag", DataType::Utf8, false),
        Field::new("intent", DataType::Utf8, false),
        Field::new("user_prompt", DataType::Utf8, false),
        Field::new("topic_continued", DataType::Boolean, false),
        Field::new("schema_version", DataType::Int32, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new("topic", DataType::Utf8, false),
        Field::new("provider", DataType::Utf8, false),
        Field::new("model", DataType::Utf8, false),
        Field::new("access_count", DataType::Int32, false),
        Field::new("last_accessed_at", DataType::Utf8, true),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ])
}
