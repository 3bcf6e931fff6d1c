//! The generic consumer loop: block-read one message, dispatch, acknowledge.
//!
//! Acknowledgment is governed by an explicit per-stage policy instead of
//! being buried in a catch block. Both pipeline stages run `AckPolicy::Always`
//! so a poison message is drained after its failure is recorded on the owning
//! entity; only an error escaping the handler leaves the message pending for
//! redelivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::WorkerError;
use crate::stream::{DurableStream, StreamError};

const DEFAULT_BLOCK: Duration = Duration::from_secs(5);
const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Business-level result of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The message was processed to completion.
    Completed,
    /// Processing failed and the failure was recorded on the owning entity.
    Failed,
}

/// When the runner acknowledges a handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// Acknowledge completed and failed messages alike, so a poison message
    /// never blocks the stream.
    Always,
    /// Acknowledge only completed messages; failures are redelivered.
    OnSuccess,
}

impl AckPolicy {
    pub fn should_ack(self, outcome: StageOutcome) -> bool {
        match self {
            AckPolicy::Always => true,
            AckPolicy::OnSuccess => outcome == StageOutcome::Completed,
        }
    }
}

/// One pipeline stage: a typed message plus the handling logic.
#[async_trait]
pub trait StageHandler: Send + Sync {
    type Message: DeserializeOwned + Send;

    /// Stage name for logs.
    fn stage(&self) -> &'static str;

    async fn handle(
        &self,
        message_id: &str,
        message: Self::Message,
    ) -> Result<StageOutcome, WorkerError>;
}

/// Configuration for one stage's consumer loop.
#[derive(Debug, Clone)]
pub struct StageRunner {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub block: Duration,
    pub failure_backoff: Duration,
    pub ack_policy: AckPolicy,
}

impl StageRunner {
    pub fn new(
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            block: DEFAULT_BLOCK,
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            ack_policy: AckPolicy::Always,
        }
    }

    #[must_use]
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    #[must_use]
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    /// Run the loop until the shutdown token fires. The token is checked at
    /// least once per block interval; an in-flight handler always runs to
    /// completion.
    pub async fn run<H>(
        &self,
        stream: Arc<dyn DurableStream>,
        handler: H,
        shutdown: CancellationToken,
    ) -> Result<(), StreamError>
    where
        H: StageHandler,
    {
        stream.ensure_group(&self.stream, &self.group).await?;
        tracing::info!(
            stage = handler.stage(),
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer,
            "stage worker started"
        );

        while !shutdown.is_cancelled() {
            let entry = match stream
                .read_group(&self.stream, &self.group, &self.consumer, self.block)
                .await
            {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(
                        stage = handler.stage(),
                        stream = %self.stream,
                        error = %err,
                        "error reading from stream; backing off"
                    );
                    tokio::time::sleep(self.failure_backoff).await;
                    continue;
                }
            };

            let message: H::Message = match serde_json::from_value(entry.data.clone()) {
                Ok(message) => message,
                Err(err) => {
                    // Undecodable payloads can never succeed; drain them.
                    tracing::error!(
                        stage = handler.stage(),
                        message_id = %entry.id,
                        error = %err,
                        "dropping undecodable message"
                    );
                    self.ack(&stream, &entry.id).await;
                    continue;
                }
            };

            match handler.handle(&entry.id, message).await {
                Ok(outcome) => {
                    if self.ack_policy.should_ack(outcome) {
                        self.ack(&stream, &entry.id).await;
                    }
                }
                Err(err) => {
                    tracing::error!(
                        stage = handler.stage(),
                        message_id = %entry.id,
                        error = %err,
                        "handler error escaped; leaving message pending and backing off"
                    );
                    tokio::time::sleep(self.failure_backoff).await;
                }
            }
        }

        tracing::info!(stage = handler.stage(), stream = %self.stream, "stage worker stopped");
        Ok(())
    }

    async fn ack(&self, stream: &Arc<dyn DurableStream>, id: &str) {
        if let Err(err) = stream.ack(&self.stream, &self.group, id).await {
            tracing::warn!(
                stream = %self.stream,
                group = %self.group,
                message_id = %id,
                error = %err,
                "failed to acknowledge message"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{append_message, MemoryStream};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    struct CountingHandler {
        handled: Arc<AtomicU32>,
        outcome: StageOutcome,
    }

    #[async_trait]
    impl StageHandler for CountingHandler {
        type Message = Ping;

        fn stage(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _id: &str, _msg: Ping) -> Result<StageOutcome, WorkerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome)
        }
    }

    async fn run_until<F, Fut>(stream: Arc<MemoryStream>, runner: StageRunner, handler: CountingHandler, until: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let shutdown = CancellationToken::new();
        let loop_stream: Arc<dyn DurableStream> = stream;
        let task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runner.run(loop_stream, handler, shutdown).await })
        };
        for _ in 0..200 {
            if until().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        task.await.expect("join").expect("runner exits cleanly");
    }

    #[tokio::test]
    async fn completed_messages_are_acked() {
        let stream = MemoryStream::new();
        let id = append_message(stream.as_ref(), "s", &Ping { n: 1 })
            .await
            .expect("append");
        let handled = Arc::new(AtomicU32::new(0));
        let handler = CountingHandler {
            handled: handled.clone(),
            outcome: StageOutcome::Completed,
        };
        let runner = StageRunner::new("s", "g", "c").with_block(Duration::from_millis(10));

        {
            let stream = stream.clone();
            let handled = handled.clone();
            let id = id.clone();
            run_until(stream.clone(), runner, handler, move || {
                let stream = stream.clone();
                let handled = handled.clone();
                let id = id.clone();
                async move {
                    handled.load(Ordering::SeqCst) == 1 && stream.ack_count("s", "g", &id).await == 1
                }
            })
            .await;
        }

        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(stream.ack_count("s", "g", "1-0").await, 1);
    }

    #[tokio::test]
    async fn failed_outcomes_are_still_acked_under_ack_always() {
        let stream = MemoryStream::new();
        let id = append_message(stream.as_ref(), "s", &Ping { n: 1 })
            .await
            .expect("append");
        let handled = Arc::new(AtomicU32::new(0));
        let handler = CountingHandler {
            handled: handled.clone(),
            outcome: StageOutcome::Failed,
        };
        let runner = StageRunner::new("s", "g", "c").with_block(Duration::from_millis(10));

        {
            let stream = stream.clone();
            let id = id.clone();
            run_until(stream.clone(), runner, handler, move || {
                let stream = stream.clone();
                let id = id.clone();
                async move { stream.ack_count("s", "g", &id).await == 1 }
            })
            .await;
        }

        assert_eq!(stream.ack_count("s", "g", &id).await, 1, "acked exactly once");
    }

    #[tokio::test]
    async fn undecodable_messages_are_drained() {
        let stream = MemoryStream::new();
        let id = stream
            .append("s", &serde_json::json!({"not": "a ping"}))
            .await
            .expect("append");
        let handled = Arc::new(AtomicU32::new(0));
        let handler = CountingHandler {
            handled: handled.clone(),
            outcome: StageOutcome::Completed,
        };
        let runner = StageRunner::new("s", "g", "c").with_block(Duration::from_millis(10));

        {
            let stream = stream.clone();
            let id = id.clone();
            run_until(stream.clone(), runner, handler, move || {
                let stream = stream.clone();
                let id = id.clone();
                async move { stream.ack_count("s", "g", &id).await == 1 }
            })
            .await;
        }

        assert_eq!(handled.load(Ordering::SeqCst), 0, "handler never sees it");
        assert_eq!(stream.ack_count("s", "g", &id).await, 1);
    }
}
