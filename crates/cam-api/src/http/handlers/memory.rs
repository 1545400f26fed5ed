//! Memory inspection endpoints.
//!
//! GET  /v1/memory/debug      - total count and a preview of the newest records
//! POST /v1/retrieve-context  - the context a prompt would receive (global mode)

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use cam_core::gate::retrieval::RetrievalOptions;
use cam_types::memory::{MemoryMetadata, RetrievalMode, StoredMemory};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const DEBUG_PREVIEW_RECORDS: usize = 5;
const DEBUG_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Serialize)]
pub struct MemoryDebug {
    pub count: u64,
    pub examples: Vec<MemoryPreview>,
}

#[derive(Debug, Serialize)]
pub struct MemoryPreview {
    pub id: uuid::Uuid,
    pub doc: String,
    pub meta: MemoryMetadata,
}

impl From<StoredMemory> for MemoryPreview {
    fn from(memory: StoredMemory) -> Self {
        Self {
            id: memory.id,
            doc: memory.text.chars().take(DEBUG_PREVIEW_CHARS).collect(),
            meta: memory.metadata,
        }
    }
}

pub async fn memory_debug(
    State(state): State<AppState>,
) -> Result<ApiResponse<MemoryDebug>, AppError> {
    let start = Instant::now();
    let store = state.pipeline.store();
    let count = store.count().await?;
    let examples = store
        .peek(DEBUG_PREVIEW_RECORDS)
        .await?
        .into_iter()
        .map(MemoryPreview::from)
        .collect();

    Ok(ApiResponse::success(MemoryDebug { count, examples }, start))
}

#[derive(Debug, Deserialize)]
pub struct RetrieveContextRequest {
    pub prompt: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveContextResponse {
    pub prompt: String,
    pub context: Option<String>,
}

pub async fn retrieve_context(
    State(state): State<AppState>,
    Json(body): Json<RetrieveContextRequest>,
) -> Result<ApiResponse<RetrieveContextResponse>, AppError> {
    let start = Instant::now();
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::Validation("Prompt cannot be empty".to_string()));
    }
    let k = body
        .top_k
        .unwrap_or_else(|| state.config.current().retrieval.top_k);
    if k == 0 {
        return Err(AppError::Validation("top_k must be at least 1".to_string()));
    }

    let options = RetrievalOptions::new(k, RetrievalMode::Global);
    let context = state.pipeline.retrieval().context(prompt, &options).await;

    Ok(ApiResponse::success(
        RetrieveContextResponse {
            prompt: prompt.to_string(),
            context,
        },
        start,
    ))
}
