//! Scene records: the per-chunk unit of work for the analysis stage.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::analysis::SceneAnalysis;

/// Analysis lifecycle of a single scene.
///
/// Happy path is `PendingAnalysis -> Analyzed -> Indexed`; any step of
/// analysis may drop the scene into the terminal `FailedAnalysis`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SceneStatus {
    PendingAnalysis,
    Analyzed,
    Indexed,
    FailedAnalysis,
}

impl SceneStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SceneStatus::Indexed | SceneStatus::FailedAnalysis)
    }

    pub fn can_transition(self, next: SceneStatus) -> bool {
        match (self, next) {
            (SceneStatus::PendingAnalysis, SceneStatus::Analyzed)
            | (SceneStatus::Analyzed, SceneStatus::Indexed) => true,
            (SceneStatus::PendingAnalysis, SceneStatus::FailedAnalysis)
            | (SceneStatus::Analyzed, SceneStatus::FailedAnalysis) => true,
            _ => false,
        }
    }
}

/// One chunk of a submitted script.
///
/// `sequence_number` is assigned once at creation and defines presentation
/// order only; delivery order across the analysis group is unordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_id: String,
    pub job_id: String,
    /// 1-based position within the script, unique per job.
    pub sequence_number: u32,
    pub header: String,
    pub text: String,
    pub status: SceneStatus,
    #[serde(default)]
    pub analysis: Option<SceneAnalysis>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl SceneRecord {
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        sequence_number: u32,
        header: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let job_id = job_id.into();
        debug_assert!(!job_id.is_empty());
        debug_assert!(sequence_number >= 1);
        Self {
            scene_id: Self::scene_id_for(&job_id, sequence_number),
            job_id,
            sequence_number,
            header: header.into(),
            text: text.into(),
            status: SceneStatus::PendingAnalysis,
            analysis: None,
            error_message: None,
        }
    }

    /// Deterministic id so redelivered chunking messages map to the same
    /// record instead of minting duplicates.
    pub fn scene_id_for(job_id: &str, sequence_number: u32) -> String {
        format!("scene-{job_id}-{sequence_number}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        assert!(SceneStatus::PendingAnalysis.can_transition(SceneStatus::Analyzed));
        assert!(SceneStatus::Analyzed.can_transition(SceneStatus::Indexed));
        assert!(!SceneStatus::PendingAnalysis.can_transition(SceneStatus::Indexed));
        assert!(!SceneStatus::Indexed.can_transition(SceneStatus::Analyzed));
    }

    #[test]
    fn failed_analysis_is_terminal() {
        assert!(SceneStatus::PendingAnalysis.can_transition(SceneStatus::FailedAnalysis));
        assert!(SceneStatus::Analyzed.can_transition(SceneStatus::FailedAnalysis));
        assert!(!SceneStatus::FailedAnalysis.can_transition(SceneStatus::PendingAnalysis));
        assert!(!SceneStatus::FailedAnalysis.can_transition(SceneStatus::Indexed));
    }

    #[test]
    fn scene_ids_are_deterministic_per_job_and_position() {
        let scene = SceneRecord::new("job-7", 3, "INT. KITCHEN - DAY", "body");
        assert_eq!(scene.scene_id, "scene-job-7-3");
        assert_eq!(scene.scene_id, SceneRecord::scene_id_for("job-7", 3));
        assert_eq!(scene.status, SceneStatus::PendingAnalysis);
    }
}
