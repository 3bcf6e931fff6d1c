//! Job and scene persistence.
//!
//! Typed repositories over the document store. The one contract that matters
//! under concurrency is [`JobStore::increment_processed`]: it must be a
//! storage-native atomic increment-and-fetch, because analysis workers for
//! different scenes of the same job race on the counter and a plain
//! read-modify-write would lose updates.

pub mod memory;
pub mod redis;

pub use self::memory::{MemoryJobStore, MemorySceneStore};
pub use self::redis::{RedisJobStore, RedisSceneStore};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{JobProgress, JobRecord, JobStatus, SceneAnalysis, SceneRecord, SceneStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] ::redis::RedisError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("record `{0}` already exists")]
    Duplicate(String),
    #[error("record `{0}` not found")]
    NotFound(String),
    #[error("malformed stored record `{id}`: {reason}")]
    Malformed { id: String, reason: String },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &JobRecord) -> Result<(), StoreError>;

    async fn find(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Set once, after chunking.
    async fn set_scene_count(&self, job_id: &str, count: u32) -> Result<(), StoreError>;

    /// Reset the progress counter when the analysis stage begins.
    async fn reset_processed(&self, job_id: &str) -> Result<(), StoreError>;

    /// Atomically add one to the progress counter and return the updated
    /// counter together with the scene count from the same round-trip.
    async fn increment_processed(&self, job_id: &str) -> Result<JobProgress, StoreError>;
}

#[async_trait]
pub trait SceneStore: Send + Sync {
    /// Insert a scene record. Returns `false` without modifying anything if a
    /// record with the same id already exists, so redelivered chunking
    /// messages cannot mint duplicates.
    async fn insert(&self, scene: &SceneRecord) -> Result<bool, StoreError>;

    async fn find(&self, scene_id: &str) -> Result<Option<SceneRecord>, StoreError>;

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<SceneRecord>, StoreError>;

    /// Store the validated analysis payload and move the scene to `Analyzed`.
    async fn record_analysis(
        &self,
        scene_id: &str,
        analysis: &SceneAnalysis,
    ) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        scene_id: &str,
        status: SceneStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;
}
