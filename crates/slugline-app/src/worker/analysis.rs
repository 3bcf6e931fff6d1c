//! Analysis stage: run structured extraction and embedding for one scene,
//! index the result, and advance the job's progress counter.
//!
//! The counter crossing is the only completion trigger: the worker whose
//! atomic increment observes `processed == scene_count` transitions the job
//! and hands off to the graph stage, and the storage-level
//! increment-and-fetch guarantees exactly one worker sees that value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::runner::{StageHandler, StageOutcome};
use super::{PipelineContext, StepError, WorkerError};
use crate::llm::{
    scene_analysis_prompt, CompletionClient as _, EmbeddingClient as _, LlmError,
};
use crate::model::{is_complete, JobStatus, SceneAnalysis, SceneStatus};
use crate::progress::{ProgressEvent, ProgressNotifier as _};
use crate::retry::{self, RetryPolicy};
use crate::store::{JobStore as _, SceneStore as _};
use crate::stream::{append_message, GraphRequest, SceneReady, STREAM_GRAPH_GENERATION};
use crate::vector::{SceneIndex as _, SceneVectorRecord};

/// Budget for the structured-extraction call.
const COMPLETION_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_millis(1500), 2.0);
/// Independent budget for the embedding call.
const EMBEDDING_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_millis(1000), 2.0);

pub struct AnalysisHandler {
    ctx: Arc<PipelineContext>,
    completion_retry: RetryPolicy,
    embedding_retry: RetryPolicy,
}

impl AnalysisHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            completion_retry: COMPLETION_RETRY,
            embedding_retry: EMBEDDING_RETRY,
        }
    }

    /// Override the retry budgets (tests shrink the delays).
    #[must_use]
    pub fn with_retry_policies(mut self, completion: RetryPolicy, embedding: RetryPolicy) -> Self {
        self.completion_retry = completion;
        self.embedding_retry = embedding;
        self
    }

    async fn process(&self, message: &SceneReady) -> Result<(), StepError> {
        let ctx = &self.ctx;
        let job_id = &message.job_id;
        let scene_id = &message.scene_id;

        let prompt = scene_analysis_prompt(&message.header, &message.text);
        let raw = retry::invoke(
            &self.completion_retry,
            || ctx.completion.complete(&prompt),
            LlmError::is_retryable,
        )
        .await?;
        tracing::debug!(job_id = %job_id, scene_id = %scene_id, "received structured analysis");

        // The call is retried; a malformed or non-conforming payload is not.
        let analysis: SceneAnalysis = serde_json::from_str(&raw)?;
        analysis.validate()?;

        ctx.scenes.record_analysis(scene_id, &analysis).await?;

        let text_to_embed = analysis.text_to_embed(&message.text).to_string();
        let vector = retry::invoke(
            &self.embedding_retry,
            || ctx.embedding.embed(&text_to_embed),
            LlmError::is_retryable,
        )
        .await?;
        tracing::debug!(job_id = %job_id, scene_id = %scene_id, dimensions = vector.len(), "embedded scene");

        let record = SceneVectorRecord {
            scene_id: scene_id.clone(),
            job_id: job_id.clone(),
            sequence_number: message.sequence_number,
            title: analysis.title.clone(),
            summary: analysis.summary.clone(),
            characters: analysis.characters.clone(),
            locations: analysis.locations.clone(),
            vector,
        };
        let outcomes = ctx.index.batch_write(std::slice::from_ref(&record)).await?;
        for outcome in &outcomes {
            if let Some(error) = &outcome.error {
                // Item-level write errors are observable but do not abort
                // the handler.
                tracing::error!(
                    job_id = %job_id,
                    scene_id = %outcome.scene_id,
                    error = %error,
                    "vector store rejected batch item"
                );
            }
        }

        ctx.scenes
            .update_status(scene_id, SceneStatus::Indexed, None)
            .await?;

        let progress = ctx.jobs.increment_processed(job_id).await?;
        let percent = progress
            .total
            .filter(|total| *total > 0)
            .map(|total| ((progress.processed as f64 * 100.0) / total as f64).round() as u8)
            .unwrap_or(0);
        tracing::info!(
            job_id = %job_id,
            scene_id = %scene_id,
            processed = progress.processed,
            total = ?progress.total,
            "scene indexed"
        );
        ctx.progress
            .publish(
                job_id,
                ProgressEvent::new(JobStatus::Analyzing, percent.min(100)).with_message(format!(
                    "Analyzed scene {}/{}...",
                    progress.processed,
                    progress.total.unwrap_or(0)
                )),
            )
            .await;

        if is_complete(progress.processed, progress.total) {
            tracing::info!(job_id = %job_id, "all scenes analyzed; handing off to graph generation");
            ctx.jobs
                .update_status(job_id, JobStatus::GeneratingGraph, None)
                .await?;
            ctx.progress
                .publish(
                    job_id,
                    ProgressEvent::new(JobStatus::GeneratingGraph, 0)
                        .with_message("Building character relationship graph..."),
                )
                .await;
            append_message(
                ctx.stream.as_ref(),
                STREAM_GRAPH_GENERATION,
                &GraphRequest {
                    job_id: job_id.clone(),
                },
            )
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl StageHandler for AnalysisHandler {
    type Message = SceneReady;

    fn stage(&self) -> &'static str {
        "analysis"
    }

    async fn handle(
        &self,
        message_id: &str,
        message: SceneReady,
    ) -> Result<StageOutcome, WorkerError> {
        let job_id = message.job_id.clone();
        let scene_id = message.scene_id.clone();
        tracing::info!(job_id = %job_id, scene_id = %scene_id, message_id, "processing scene analysis");

        // Record-then-publish ordering means the record exists; a missing
        // record indicates an out-of-band deletion and the message can only
        // be drained.
        let Some(scene) = self.ctx.scenes.find(&scene_id).await? else {
            tracing::warn!(scene_id = %scene_id, message_id, "analysis request for unknown scene");
            return Ok(StageOutcome::Completed);
        };
        if scene.status.is_terminal() {
            tracing::info!(
                scene_id = %scene_id,
                status = ?scene.status,
                message_id,
                "scene already settled; ignoring redelivered request"
            );
            return Ok(StageOutcome::Completed);
        }

        if let Err(err) = self.process(&message).await {
            tracing::error!(
                job_id = %job_id,
                scene_id = %scene_id,
                message_id,
                error = %err,
                "scene analysis failed"
            );
            // The job's progress counter is deliberately left untouched
            // here: a permanently failed scene keeps the job in Analyzing
            // until an operator intervenes.
            self.ctx
                .scenes
                .update_status(
                    &scene_id,
                    SceneStatus::FailedAnalysis,
                    Some(format!("Analysis/indexing error: {err}")),
                )
                .await?;
            return Ok(StageOutcome::Failed);
        }

        Ok(StageOutcome::Completed)
    }
}
