//! Stage workers and the generic consumer loop.

pub mod analysis;
pub mod chunking;
pub mod context;
pub mod runner;

pub use analysis::AnalysisHandler;
pub use chunking::ChunkingHandler;
pub use context::{PipelineContext, PipelineContextBuilder};
pub use runner::{AckPolicy, StageHandler, StageOutcome, StageRunner};

use thiserror::Error;

use crate::llm::LlmError;
use crate::model::AnalysisValidationError;
use crate::object_store::ObjectStoreError;
use crate::retry::RetryError;
use crate::segment::SegmentError;
use crate::store::StoreError;
use crate::stream::StreamError;
use crate::vector::IndexError;

/// Business-level failure inside a stage step. Handlers catch these, record
/// them on the owning entity, and still let the message be acknowledged.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Objects(#[from] ObjectStoreError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Llm(#[from] RetryError<LlmError>),
    #[error("analysis response is not valid JSON: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] AnalysisValidationError),
}

/// Failure that escapes a handler entirely, typically the store refusing
/// the write that records a business failure. The runner treats this as a
/// bug: it logs, skips the acknowledgment, and backs off.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}
