//! Typed payloads carried on each pipeline stream.
//!
//! Each stream is homogeneous: producers serialize one of these structs into
//! the entry's `data` field and the consuming stage deserializes the same
//! type back, so handlers never touch an untyped field map.

use serde::{Deserialize, Serialize};

/// "Document submitted" message consumed by the chunking stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub job_id: String,
    /// Object-store key of the uploaded source document.
    pub source_ref: String,
}

/// "Scene ready for analysis" message fanned out by the chunking stage.
///
/// Carries the full scene text so analysis workers do not re-read the scene
/// record on the hot path; the persisted record exists before this message
/// is ever published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneReady {
    pub job_id: String,
    pub scene_id: String,
    pub sequence_number: u32,
    pub header: String,
    pub text: String,
}

/// Hand-off to the downstream graph-generation stage, published exactly once
/// per job by whichever analysis worker observes the completion crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRequest {
    pub job_id: String,
}
