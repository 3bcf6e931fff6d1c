//! Vector index for analyzed scenes.

pub mod memory;
pub mod weaviate;

pub use memory::MemorySceneIndex;
pub use weaviate::WeaviateIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One indexed scene: embedding plus denormalized metadata so search results
/// can be rendered without a second lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneVectorRecord {
    pub scene_id: String,
    pub job_id: String,
    pub sequence_number: u32,
    pub title: String,
    pub summary: String,
    pub characters: Vec<String>,
    pub locations: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
}

/// Per-item result of a batch write. The store reports item failures inline
/// rather than failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemOutcome {
    pub scene_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("vector index request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected vector index response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait SceneIndex: Send + Sync {
    /// Write a batch of records, returning one outcome per input record.
    async fn batch_write(
        &self,
        records: &[SceneVectorRecord],
    ) -> Result<Vec<BatchItemOutcome>, IndexError>;
}
