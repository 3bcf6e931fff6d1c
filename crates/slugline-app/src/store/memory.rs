//! Mutex-held in-memory repositories.
//!
//! `increment_processed` performs its read and write under one lock
//! acquisition, giving the same atomic increment-and-fetch contract as the
//! Redis backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{JobStore, SceneStore, StoreError};
use crate::model::{JobProgress, JobRecord, JobStatus, SceneAnalysis, SceneRecord, SceneStatus};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::Duplicate(job.job_id.clone()));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn find(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.get(job_id).cloned())
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        job.set_status(status, error);
        Ok(())
    }

    async fn set_scene_count(&self, job_id: &str, count: u32) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        job.scene_count = Some(count);
        job.updated_at_ms = crate::model::current_timestamp_ms();
        Ok(())
    }

    async fn reset_processed(&self, job_id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        job.processed_scenes = 0;
        job.updated_at_ms = crate::model::current_timestamp_ms();
        Ok(())
    }

    async fn increment_processed(&self, job_id: &str) -> Result<JobProgress, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        job.processed_scenes += 1;
        job.updated_at_ms = crate::model::current_timestamp_ms();
        Ok(JobProgress {
            processed: job.processed_scenes,
            total: job.scene_count,
        })
    }
}

#[derive(Default)]
pub struct MemorySceneStore {
    scenes: Mutex<HashMap<String, SceneRecord>>,
}

impl MemorySceneStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SceneStore for MemorySceneStore {
    async fn insert(&self, scene: &SceneRecord) -> Result<bool, StoreError> {
        let mut scenes = self.scenes.lock().await;
        if scenes.contains_key(&scene.scene_id) {
            return Ok(false);
        }
        scenes.insert(scene.scene_id.clone(), scene.clone());
        Ok(true)
    }

    async fn find(&self, scene_id: &str) -> Result<Option<SceneRecord>, StoreError> {
        let scenes = self.scenes.lock().await;
        Ok(scenes.get(scene_id).cloned())
    }

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<SceneRecord>, StoreError> {
        let scenes = self.scenes.lock().await;
        let mut matched: Vec<SceneRecord> = scenes
            .values()
            .filter(|scene| scene.job_id == job_id)
            .cloned()
            .collect();
        matched.sort_by_key(|scene| scene.sequence_number);
        Ok(matched)
    }

    async fn record_analysis(
        &self,
        scene_id: &str,
        analysis: &SceneAnalysis,
    ) -> Result<(), StoreError> {
        let mut scenes = self.scenes.lock().await;
        let scene = scenes
            .get_mut(scene_id)
            .ok_or_else(|| StoreError::NotFound(scene_id.to_string()))?;
        scene.analysis = Some(analysis.clone());
        scene.status = SceneStatus::Analyzed;
        Ok(())
    }

    async fn update_status(
        &self,
        scene_id: &str,
        status: SceneStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut scenes = self.scenes.lock().await;
        let scene = scenes
            .get_mut(scene_id)
            .ok_or_else(|| StoreError::NotFound(scene_id.to_string()))?;
        scene.status = status;
        scene.error_message = error;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_job_insert_is_rejected() {
        let store = MemoryJobStore::new();
        let job = JobRecord::new("job-1", "scripts/job-1");
        store.insert(&job).await.expect("first insert");
        let err = store.insert(&job).await.expect_err("duplicate rejected");
        assert!(matches!(err, StoreError::Duplicate(id) if id == "job-1"));
    }

    #[tokio::test]
    async fn duplicate_scene_insert_is_a_noop() {
        let store = MemorySceneStore::new();
        let scene = SceneRecord::new("job-1", 1, "INT. LAB - DAY", "text");
        assert!(store.insert(&scene).await.expect("insert"));

        let mut tampered = scene.clone();
        tampered.text = "different".to_string();
        assert!(!store.insert(&tampered).await.expect("second insert"));

        let stored = store
            .find(&scene.scene_id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.text, "text", "original record untouched");
    }

    #[tokio::test]
    async fn increment_returns_counter_and_total_together() {
        let store = MemoryJobStore::new();
        let job = JobRecord::new("job-1", "scripts/job-1");
        store.insert(&job).await.expect("insert");
        store.set_scene_count("job-1", 2).await.expect("count");

        let first = store.increment_processed("job-1").await.expect("inc");
        assert_eq!(first, JobProgress { processed: 1, total: Some(2) });
        let second = store.increment_processed("job-1").await.expect("inc");
        assert_eq!(second, JobProgress { processed: 2, total: Some(2) });
    }

    #[tokio::test]
    async fn concurrent_increments_observe_distinct_values() {
        let store = MemoryJobStore::new();
        let job = JobRecord::new("job-1", "scripts/job-1");
        store.insert(&job).await.expect("insert");
        store.set_scene_count("job-1", 50).await.expect("count");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_processed("job-1").await.expect("inc").processed
            }));
        }
        let mut observed = Vec::new();
        for handle in handles {
            observed.push(handle.await.expect("join"));
        }
        observed.sort_unstable();
        let expected: Vec<u32> = (1..=50).collect();
        assert_eq!(observed, expected, "every increment sees a unique value");
    }

    #[tokio::test]
    async fn scenes_list_in_sequence_order() {
        let store = MemorySceneStore::new();
        for seq in [3_u32, 1, 2] {
            let scene = SceneRecord::new("job-1", seq, format!("H{seq}"), "text");
            store.insert(&scene).await.expect("insert");
        }
        let listed = store.list_for_job("job-1").await.expect("list");
        let sequence: Vec<u32> = listed.iter().map(|s| s.sequence_number).collect();
        assert_eq!(sequence, vec![1, 2, 3]);
    }
}
