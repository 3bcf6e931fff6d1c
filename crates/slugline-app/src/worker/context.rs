//! Shared collaborator bundle handed to the stage handlers.
//!
//! Every external system the pipeline touches is injected here as a trait
//! object, constructed once at process start. There is no module-level
//! mutable state anywhere in the stages.

use std::sync::Arc;

use crate::llm::{per_second_limiter, CompletionClient, EmbeddingClient, OpenAiClient};
use crate::object_store::{FsObjectStore, MemoryObjectStore, ObjectStore};
use crate::progress::{ProgressNotifier, RedisProgressChannel};
use crate::segment::{ScreenplaySegmenter, Segmenter};
use crate::store::{JobStore, MemoryJobStore, MemorySceneStore, RedisJobStore, RedisSceneStore, SceneStore};
use crate::stream::{DurableStream, MemoryStream, RedisStream};
use crate::vector::{MemorySceneIndex, SceneIndex, WeaviateIndex};
use crate::{config::AppConfig, error::AppError};

pub struct PipelineContext {
    pub jobs: Arc<dyn JobStore>,
    pub scenes: Arc<dyn SceneStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub stream: Arc<dyn DurableStream>,
    pub completion: Arc<dyn CompletionClient>,
    pub embedding: Arc<dyn EmbeddingClient>,
    pub index: Arc<dyn SceneIndex>,
    pub progress: Arc<dyn ProgressNotifier>,
    pub segmenter: Arc<dyn Segmenter>,
}

/// Assemble a context piece by piece; used by tests and the CLI alike.
#[derive(Default)]
pub struct PipelineContextBuilder {
    jobs: Option<Arc<dyn JobStore>>,
    scenes: Option<Arc<dyn SceneStore>>,
    objects: Option<Arc<dyn ObjectStore>>,
    stream: Option<Arc<dyn DurableStream>>,
    completion: Option<Arc<dyn CompletionClient>>,
    embedding: Option<Arc<dyn EmbeddingClient>>,
    index: Option<Arc<dyn SceneIndex>>,
    progress: Option<Arc<dyn ProgressNotifier>>,
    segmenter: Option<Arc<dyn Segmenter>>,
}

impl PipelineContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn jobs(mut self, value: Arc<dyn JobStore>) -> Self {
        self.jobs = Some(value);
        self
    }

    #[must_use]
    pub fn scenes(mut self, value: Arc<dyn SceneStore>) -> Self {
        self.scenes = Some(value);
        self
    }

    #[must_use]
    pub fn objects(mut self, value: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(value);
        self
    }

    #[must_use]
    pub fn stream(mut self, value: Arc<dyn DurableStream>) -> Self {
        self.stream = Some(value);
        self
    }

    #[must_use]
    pub fn completion(mut self, value: Arc<dyn CompletionClient>) -> Self {
        self.completion = Some(value);
        self
    }

    #[must_use]
    pub fn embedding(mut self, value: Arc<dyn EmbeddingClient>) -> Self {
        self.embedding = Some(value);
        self
    }

    #[must_use]
    pub fn index(mut self, value: Arc<dyn SceneIndex>) -> Self {
        self.index = Some(value);
        self
    }

    #[must_use]
    pub fn progress(mut self, value: Arc<dyn ProgressNotifier>) -> Self {
        self.progress = Some(value);
        self
    }

    #[must_use]
    pub fn segmenter(mut self, value: Arc<dyn Segmenter>) -> Self {
        self.segmenter = Some(value);
        self
    }

    /// Finish the build; missing collaborators default to in-memory
    /// implementations so partial wiring stays usable in tests.
    pub fn build(self) -> Arc<PipelineContext> {
        Arc::new(PipelineContext {
            jobs: self.jobs.unwrap_or_else(|| MemoryJobStore::new()),
            scenes: self.scenes.unwrap_or_else(|| MemorySceneStore::new()),
            objects: self.objects.unwrap_or_else(|| MemoryObjectStore::new()),
            stream: self.stream.unwrap_or_else(|| MemoryStream::new()),
            completion: self
                .completion
                .expect("a completion client must be provided"),
            embedding: self.embedding.expect("an embedding client must be provided"),
            index: self.index.unwrap_or_else(|| MemorySceneIndex::new()),
            progress: self
                .progress
                .unwrap_or_else(|| Arc::new(crate::progress::ProgressHub::new())),
            segmenter: self
                .segmenter
                .unwrap_or_else(|| Arc::new(ScreenplaySegmenter::new())),
        })
    }
}

/// Wire the production context from configuration: Redis-backed stores,
/// streams and progress, filesystem object store, OpenAI clients and the
/// Weaviate index.
pub async fn build_pipeline_context(config: &AppConfig) -> Result<Arc<PipelineContext>, AppError> {
    let limiter = per_second_limiter(config.llm.requests_per_second);
    let llm_client = Arc::new(OpenAiClient::from_env(&config.llm, limiter)?);

    let objects: Arc<dyn ObjectStore> = match config.storage.backend.as_str() {
        "fs" => {
            tracing::debug!(path = ?config.storage.path, "initialized filesystem object store");
            Arc::new(FsObjectStore::new(&config.storage.path))
        }
        "memory" => MemoryObjectStore::new(),
        other => {
            return Err(AppError::Config(format!(
                "unknown storage backend '{other}'; expected 'fs' or 'memory'"
            )))
        }
    };

    let context = PipelineContextBuilder::new()
        .jobs(Arc::new(RedisJobStore::connect(&config.redis.url).await?))
        .scenes(Arc::new(RedisSceneStore::connect(&config.redis.url).await?))
        .objects(objects)
        .stream(Arc::new(RedisStream::connect(&config.redis.url).await?))
        .completion(llm_client.clone())
        .embedding(llm_client)
        .index(Arc::new(WeaviateIndex::new(&config.vector)?))
        .progress(Arc::new(
            RedisProgressChannel::connect(&config.redis.url)
                .await
                .map_err(crate::stream::StreamError::from)?,
        ))
        .segmenter(Arc::new(ScreenplaySegmenter::new()))
        .build();
    Ok(context)
}
