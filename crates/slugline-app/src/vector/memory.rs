//! In-memory scene index for tests and the `memory` backend.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BatchItemOutcome, IndexError, SceneIndex, SceneVectorRecord};

#[derive(Default)]
pub struct MemorySceneIndex {
    records: Mutex<Vec<SceneVectorRecord>>,
    /// Scene ids configured to report an item-level write error.
    rejected: Mutex<HashSet<String>>,
}

impl MemorySceneIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn records(&self) -> Vec<SceneVectorRecord> {
        self.records.lock().await.clone()
    }

    /// Make future writes of this scene id report a per-item error.
    pub async fn reject_scene(&self, scene_id: &str) {
        self.rejected.lock().await.insert(scene_id.to_string());
    }
}

#[async_trait]
impl SceneIndex for MemorySceneIndex {
    async fn batch_write(
        &self,
        records: &[SceneVectorRecord],
    ) -> Result<Vec<BatchItemOutcome>, IndexError> {
        let rejected = self.rejected.lock().await;
        let mut stored = self.records.lock().await;
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            if rejected.contains(&record.scene_id) {
                outcomes.push(BatchItemOutcome {
                    scene_id: record.scene_id.clone(),
                    error: Some("item rejected".to_string()),
                });
                continue;
            }
            stored.retain(|existing| existing.scene_id != record.scene_id);
            stored.push(record.clone());
            outcomes.push(BatchItemOutcome {
                scene_id: record.scene_id.clone(),
                error: None,
            });
        }
        Ok(outcomes)
    }
}
