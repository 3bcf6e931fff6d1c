//! Chunking stage: fetch a submitted script, split it into scenes, persist
//! scene records and fan them out to the analysis stream.
//!
//! Chunking failures are terminal for the job: there is no automatic retry
//! of a document that failed to chunk; the message is still acknowledged so
//! a poison document cannot block the queue.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use super::runner::{StageHandler, StageOutcome};
use super::{PipelineContext, StepError, WorkerError};
use crate::model::{JobStatus, SceneRecord};
use crate::object_store::ObjectStore as _;
use crate::progress::{ProgressEvent, ProgressNotifier as _};
use crate::segment::Segmenter as _;
use crate::store::{JobStore as _, SceneStore as _};
use crate::stream::{append_message, ChunkRequest, SceneReady, STREAM_SCENE_ANALYSIS};

const PROGRESS_FETCHING: u8 = 10;
const PROGRESS_SEGMENTING: u8 = 30;
const PROGRESS_PUBLISH_SPAN: u8 = 60;

pub struct ChunkingHandler {
    ctx: Arc<PipelineContext>,
}

impl ChunkingHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    async fn process(&self, request: &ChunkRequest) -> Result<(), StepError> {
        let ctx = &self.ctx;
        let job_id = &request.job_id;

        ctx.jobs
            .update_status(job_id, JobStatus::Chunking, None)
            .await?;
        ctx.progress
            .publish(
                job_id,
                ProgressEvent::new(JobStatus::Chunking, PROGRESS_FETCHING)
                    .with_message("Fetching source document..."),
            )
            .await;

        let bytes = ctx.objects.get(&request.source_ref).await?;
        tracing::info!(
            job_id = %job_id,
            source_ref = %request.source_ref,
            size_bytes = bytes.len(),
            "fetched source document"
        );
        ctx.progress
            .publish(
                job_id,
                ProgressEvent::new(JobStatus::Chunking, PROGRESS_SEGMENTING)
                    .with_message("Splitting screenplay into scenes..."),
            )
            .await;

        let units = ctx.segmenter.segment(&bytes)?;
        let total = units.len() as u32;
        tracing::info!(job_id = %job_id, scene_count = total, "segmented screenplay");
        ctx.jobs.set_scene_count(job_id, total).await?;

        // Record-then-publish, concurrently across scenes: a consumer must
        // never observe a message whose scene record does not exist yet.
        let published = AtomicU32::new(0);
        try_join_all(units.into_iter().map(|unit| {
            let published = &published;
            async move {
                let scene = SceneRecord::new(
                    job_id.clone(),
                    unit.sequence_number,
                    unit.header,
                    unit.content,
                );
                let inserted = ctx.scenes.insert(&scene).await?;
                if !inserted {
                    tracing::warn!(
                        job_id = %job_id,
                        scene_id = %scene.scene_id,
                        "scene record already exists; publishing anyway"
                    );
                }
                let message = SceneReady {
                    job_id: scene.job_id.clone(),
                    scene_id: scene.scene_id.clone(),
                    sequence_number: scene.sequence_number,
                    header: scene.header.clone(),
                    text: scene.text.clone(),
                };
                append_message(ctx.stream.as_ref(), STREAM_SCENE_ANALYSIS, &message).await?;

                let done = published.fetch_add(1, Ordering::SeqCst) + 1;
                if total > 1 {
                    let progress = PROGRESS_SEGMENTING
                        + ((done as f64 / total as f64) * PROGRESS_PUBLISH_SPAN as f64).round()
                            as u8;
                    ctx.progress
                        .publish(
                            job_id,
                            ProgressEvent::new(JobStatus::Chunking, progress)
                                .with_message(format!("Publishing scene {done}/{total}...")),
                        )
                        .await;
                }
                Ok::<(), StepError>(())
            }
        }))
        .await?;
        tracing::info!(job_id = %job_id, scene_count = total, "published scenes for analysis");

        ctx.jobs
            .update_status(job_id, JobStatus::Analyzing, None)
            .await?;
        ctx.jobs.reset_processed(job_id).await?;
        ctx.progress
            .publish(
                job_id,
                ProgressEvent::new(JobStatus::Analyzing, 0)
                    .with_message("Scene analysis started..."),
            )
            .await;
        Ok(())
    }
}

#[async_trait]
impl StageHandler for ChunkingHandler {
    type Message = ChunkRequest;

    fn stage(&self) -> &'static str {
        "chunking"
    }

    async fn handle(
        &self,
        message_id: &str,
        message: ChunkRequest,
    ) -> Result<StageOutcome, WorkerError> {
        let job_id = message.job_id.clone();
        tracing::info!(job_id = %job_id, message_id, "processing chunking request");

        let Some(job) = self.ctx.jobs.find(&job_id).await? else {
            tracing::warn!(job_id = %job_id, message_id, "chunking request for unknown job");
            return Ok(StageOutcome::Completed);
        };
        // At-least-once delivery: a redelivered request for a job that
        // already moved past chunking must not duplicate scene records.
        if !matches!(job.status, JobStatus::Pending | JobStatus::Chunking) {
            tracing::info!(
                job_id = %job_id,
                status = ?job.status,
                message_id,
                "job already chunked; ignoring redelivered request"
            );
            return Ok(StageOutcome::Completed);
        }

        if let Err(err) = self.process(&message).await {
            tracing::error!(job_id = %job_id, message_id, error = %err, "chunking failed");
            self.ctx
                .jobs
                .update_status(&job_id, JobStatus::Failed, Some(err.to_string()))
                .await?;
            self.ctx
                .progress
                .publish(
                    &job_id,
                    ProgressEvent::new(JobStatus::Failed, 0)
                        .with_message(format!("Chunking failed: {err}")),
                )
                .await;
            return Ok(StageOutcome::Failed);
        }

        Ok(StageOutcome::Completed)
    }
}
