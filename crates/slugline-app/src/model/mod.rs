//! Persistent records and pure state machines for jobs and scenes.

pub mod analysis;
pub mod job;
pub mod scene;

pub use analysis::{AnalysisValidationError, Emotion, SceneAnalysis};
pub use job::{is_complete, JobProgress, JobRecord, JobStatus};
pub use scene::{SceneRecord, SceneStatus};

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn current_timestamp_ms() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    since_epoch.as_millis() as i64
}
