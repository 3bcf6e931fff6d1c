//! Redis-backed repositories.
//!
//! Jobs live in one hash per record (`job:{id}`) so the progress counter can
//! use `HINCRBY`, the broker's native increment-and-fetch. Scenes are stored
//! as JSON strings (`scene:{id}`) with a per-job id set for listing; scene
//! fields are written by a single owning stage, so read-modify-write is safe
//! there.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{JobStore, SceneStore, StoreError};
use crate::model::{
    current_timestamp_ms, JobProgress, JobRecord, JobStatus, SceneAnalysis, SceneRecord,
    SceneStatus,
};

const FIELD_JOB_ID: &str = "job_id";
const FIELD_STATUS: &str = "status";
const FIELD_SOURCE_REF: &str = "source_ref";
const FIELD_SCENE_COUNT: &str = "scene_count";
const FIELD_PROCESSED: &str = "processed_scenes";
const FIELD_ERROR: &str = "error_message";
const FIELD_FINAL_URL: &str = "final_result_url";
const FIELD_CREATED_AT: &str = "created_at_ms";
const FIELD_UPDATED_AT: &str = "updated_at_ms";

fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

fn scene_key(scene_id: &str) -> String {
    format!("scene:{scene_id}")
}

fn job_scenes_key(job_id: &str) -> String {
    format!("job:{job_id}:scenes")
}

#[derive(Clone)]
pub struct RedisJobStore {
    conn: MultiplexedConnection,
}

impl RedisJobStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn parse_job(job_id: &str, fields: HashMap<String, String>) -> Result<JobRecord, StoreError> {
    let malformed = |reason: &str| StoreError::Malformed {
        id: job_id.to_string(),
        reason: reason.to_string(),
    };

    let status_raw = fields
        .get(FIELD_STATUS)
        .ok_or_else(|| malformed("missing status"))?;
    let status =
        JobStatus::from_str(status_raw).map_err(|_| malformed("unrecognized status"))?;
    let parse_i64 = |field: &str| -> Result<i64, StoreError> {
        fields
            .get(field)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| malformed(&format!("missing or invalid {field}")))
    };

    Ok(JobRecord {
        job_id: job_id.to_string(),
        status,
        source_ref: fields.get(FIELD_SOURCE_REF).cloned().unwrap_or_default(),
        scene_count: fields
            .get(FIELD_SCENE_COUNT)
            .and_then(|raw| raw.parse().ok()),
        processed_scenes: fields
            .get(FIELD_PROCESSED)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0),
        error_message: fields.get(FIELD_ERROR).cloned(),
        final_result_url: fields.get(FIELD_FINAL_URL).cloned(),
        created_at_ms: parse_i64(FIELD_CREATED_AT)?,
        updated_at_ms: parse_i64(FIELD_UPDATED_AT)?,
    })
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, job: &JobRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = job_key(&job.job_id);
        let created: bool = conn.hset_nx(&key, FIELD_JOB_ID, &job.job_id).await?;
        if !created {
            return Err(StoreError::Duplicate(job.job_id.clone()));
        }

        let mut fields: Vec<(&str, String)> = vec![
            (FIELD_STATUS, job.status.as_ref().to_string()),
            (FIELD_SOURCE_REF, job.source_ref.clone()),
            (FIELD_PROCESSED, job.processed_scenes.to_string()),
            (FIELD_CREATED_AT, job.created_at_ms.to_string()),
            (FIELD_UPDATED_AT, job.updated_at_ms.to_string()),
        ];
        if let Some(count) = job.scene_count {
            fields.push((FIELD_SCENE_COUNT, count.to_string()));
        }
        if let Some(error) = &job.error_message {
            fields.push((FIELD_ERROR, error.clone()));
        }
        let () = conn.hset_multiple(&key, &fields).await?;
        Ok(())
    }

    async fn find(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(job_key(job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        parse_job(job_id, fields).map(Some)
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = job_key(job_id);
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(StoreError::NotFound(job_id.to_string()));
        }
        let fields = [
            (FIELD_STATUS, status.as_ref().to_string()),
            (FIELD_UPDATED_AT, current_timestamp_ms().to_string()),
        ];
        let () = conn.hset_multiple(&key, &fields).await?;
        match error {
            Some(message) => {
                let () = conn.hset(&key, FIELD_ERROR, message).await?;
            }
            None => {
                let () = conn.hdel(&key, FIELD_ERROR).await?;
            }
        }
        Ok(())
    }

    async fn set_scene_count(&self, job_id: &str, count: u32) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let fields = [
            (FIELD_SCENE_COUNT, count.to_string()),
            (FIELD_UPDATED_AT, current_timestamp_ms().to_string()),
        ];
        let () = conn.hset_multiple(job_key(job_id), &fields).await?;
        Ok(())
    }

    async fn reset_processed(&self, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let fields = [
            (FIELD_PROCESSED, "0".to_string()),
            (FIELD_UPDATED_AT, current_timestamp_ms().to_string()),
        ];
        let () = conn.hset_multiple(job_key(job_id), &fields).await?;
        Ok(())
    }

    async fn increment_processed(&self, job_id: &str) -> Result<JobProgress, StoreError> {
        let mut conn = self.conn.clone();
        let key = job_key(job_id);
        // HINCRBY returns the post-increment value; the scene count is
        // written once before analysis begins, so reading it in the same
        // transaction yields a consistent pair.
        let (processed, scene_count): (i64, Option<u32>) = redis::pipe()
            .atomic()
            .hincr(&key, FIELD_PROCESSED, 1)
            .hget(&key, FIELD_SCENE_COUNT)
            .query_async(&mut conn)
            .await?;
        let () = conn
            .hset(&key, FIELD_UPDATED_AT, current_timestamp_ms().to_string())
            .await?;
        Ok(JobProgress {
            processed: processed.max(0) as u32,
            total: scene_count,
        })
    }
}

#[derive(Clone)]
pub struct RedisSceneStore {
    conn: MultiplexedConnection,
}

impl RedisSceneStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    async fn load(&self, scene_id: &str) -> Result<SceneRecord, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(scene_key(scene_id)).await?;
        let raw = raw.ok_or_else(|| StoreError::NotFound(scene_id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save(&self, scene: &SceneRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(scene)?;
        let () = conn.set(scene_key(&scene.scene_id), raw).await?;
        Ok(())
    }
}

#[async_trait]
impl SceneStore for RedisSceneStore {
    async fn insert(&self, scene: &SceneRecord) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(scene)?;
        let created: bool = conn.set_nx(scene_key(&scene.scene_id), raw).await?;
        if created {
            let () = conn
                .sadd(job_scenes_key(&scene.job_id), &scene.scene_id)
                .await?;
        }
        Ok(created)
    }

    async fn find(&self, scene_id: &str) -> Result<Option<SceneRecord>, StoreError> {
        match self.load(scene_id).await {
            Ok(scene) => Ok(Some(scene)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<SceneRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(job_scenes_key(job_id)).await?;
        let mut scenes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(scene) = self.find(&id).await? {
                scenes.push(scene);
            }
        }
        scenes.sort_by_key(|scene| scene.sequence_number);
        Ok(scenes)
    }

    async fn record_analysis(
        &self,
        scene_id: &str,
        analysis: &SceneAnalysis,
    ) -> Result<(), StoreError> {
        let mut scene = self.load(scene_id).await?;
        scene.analysis = Some(analysis.clone());
        scene.status = SceneStatus::Analyzed;
        self.save(&scene).await
    }

    async fn update_status(
        &self,
        scene_id: &str,
        status: SceneStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut scene = self.load(scene_id).await?;
        scene.status = status;
        scene.error_message = error;
        self.save(&scene).await
    }
}
