//! Job lifecycle: one record per submitted script, advanced stage by stage.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

use super::current_timestamp_ms;

/// Macro-stage of a submitted script.
///
/// The only forward path is
/// `Pending -> Chunking -> Analyzing -> GeneratingGraph -> Completed`;
/// any non-terminal state may jump to `Failed`. Terminal states are frozen.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Chunking,
    Analyzing,
    GeneratingGraph,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobStatus::Failed {
            return true;
        }
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Chunking)
                | (JobStatus::Chunking, JobStatus::Analyzing)
                | (JobStatus::Analyzing, JobStatus::GeneratingGraph)
                | (JobStatus::GeneratingGraph, JobStatus::Completed)
        )
    }
}

/// Completion predicate for the analysis stage.
///
/// True iff the scene count is known and every scene has been processed.
/// Evaluated after each counter increment; there is no queue-depth probe,
/// because consumer groups do not expose depth reliably.
pub fn is_complete(processed_scenes: u32, scene_count: Option<u32>) -> bool {
    matches!(scene_count, Some(total) if processed_scenes == total)
}

/// Snapshot returned by the atomic increment-and-fetch on the progress
/// counter. Both fields come from the same storage round-trip so concurrent
/// workers each observe a distinct counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    pub processed: u32,
    pub total: Option<u32>,
}

/// A submitted script making its way through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    /// Object-store key of the uploaded source document.
    pub source_ref: String,
    /// Set once, after chunking.
    #[serde(default)]
    pub scene_count: Option<u32>,
    /// Monotonically incremented by analysis workers; never decremented.
    #[serde(default)]
    pub processed_scenes: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Filled in by the downstream graph stage once results are packaged.
    #[serde(default)]
    pub final_result_url: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl JobRecord {
    #[must_use]
    pub fn new(job_id: impl Into<String>, source_ref: impl Into<String>) -> Self {
        let job_id = job_id.into();
        debug_assert!(!job_id.is_empty());
        let now_ms = current_timestamp_ms();
        Self {
            job_id,
            status: JobStatus::Pending,
            source_ref: source_ref.into(),
            scene_count: None,
            processed_scenes: 0,
            error_message: None,
            final_result_url: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn set_status(&mut self, status: JobStatus, error: Option<String>) {
        self.status = status;
        self.error_message = error;
        self.updated_at_ms = current_timestamp_ms();
    }
}
