//! Application-level error type shared by the binary's commands.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::AppConfigError;
use crate::llm::LlmError;
use crate::object_store::ObjectStoreError;
use crate::store::StoreError;
use crate::stream::StreamError;
use crate::vector::IndexError;
use crate::worker::WorkerError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] AppConfigError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Objects(#[from] ObjectStoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("job `{0}` not found")]
    JobNotFound(String),
}
