//! Durable append-only streams with consumer-group delivery.
//!
//! Every stage of the pipeline reads exactly one stream through a named
//! consumer group (at-least-once: a message is delivered to one group member
//! and redelivered only if it was never acknowledged).

pub mod memory;
pub mod message;
pub mod redis;

pub use self::memory::MemoryStream;
pub use self::message::{ChunkRequest, GraphRequest, SceneReady};
pub use self::redis::RedisStream;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub const STREAM_PDF_CHUNKS: &str = "stream_pdf_chunks";
pub const STREAM_SCENE_ANALYSIS: &str = "stream_scene_analysis";
pub const STREAM_GRAPH_GENERATION: &str = "stream_graph_generation";

pub const GROUP_CHUNK_WORKERS: &str = "group_chunk_workers";
pub const GROUP_ANALYSIS_WORKERS: &str = "group_analysis_workers";

pub type MessageId = String;

/// One delivered stream entry: broker-assigned id plus the JSON payload
/// written by the producer.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: MessageId,
    pub data: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Redis(#[from] ::redis::RedisError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("malformed stream reply: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait DurableStream: Send + Sync {
    /// Create the consumer group (and the stream itself) if missing.
    /// Idempotent: an already-existing group is not an error.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError>;

    /// Append a payload and return the broker-assigned message id.
    async fn append(&self, stream: &str, data: &serde_json::Value)
        -> Result<MessageId, StreamError>;

    /// Block for up to `block` waiting for one new message for this consumer.
    /// Returns `None` on timeout.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<StreamEntry>, StreamError>;

    /// Acknowledge a delivered message, removing it from the group's pending
    /// accounting.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError>;
}

/// Serialize a typed message and append it.
pub async fn append_message<M: Serialize + Sync>(
    stream: &dyn DurableStream,
    name: &str,
    message: &M,
) -> Result<MessageId, StreamError> {
    let data = serde_json::to_value(message)?;
    stream.append(name, &data).await
}
