//! Per-job progress broadcasting.
//!
//! Progress is a derived projection, not the system of record: publishing is
//! fire-and-forget, and a failed publish is logged without affecting the
//! pipeline. The percentage scale resets at each macro-stage.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::JobStatus;

const BROADCAST_CAPACITY: usize = 256;

/// A typed progress update for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: JobStatus,
    /// 0..=100 within the current macro-stage.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result_url: Option<String>,
}

impl ProgressEvent {
    pub fn new(status: JobStatus, progress: u8) -> Self {
        debug_assert!(progress <= 100);
        Self {
            status,
            progress,
            message: None,
            final_result_url: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    /// Deliver an event to this job's subscribers, best effort.
    async fn publish(&self, job_id: &str, event: ProgressEvent);
}

/// Redis pub/sub notifier on channel `progress:{job_id}`, consumed by the
/// external push layer (SSE/WebSocket).
#[derive(Clone)]
pub struct RedisProgressChannel {
    conn: MultiplexedConnection,
}

impl RedisProgressChannel {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProgressNotifier for RedisProgressChannel {
    async fn publish(&self, job_id: &str, event: ProgressEvent) {
        let channel = format!("progress:{job_id}");
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(job_id, error = %err, "failed to serialize progress event");
                return;
            }
        };
        let mut conn = self.conn.clone();
        let published: redis::RedisResult<i64> = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(&mut conn)
            .await;
        match published {
            Ok(_) => {
                tracing::debug!(job_id, status = ?event.status, progress = event.progress, "published progress update");
            }
            Err(err) => {
                tracing::error!(job_id, channel = %channel, error = %err, "failed to publish progress update");
            }
        }
    }
}

/// In-process fan-out hub with one broadcast channel per job.
///
/// Events published to a job with no subscribers are silently dropped; slow
/// receivers observe a lagged error rather than blocking the publisher.
#[derive(Default)]
pub struct ProgressHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all future events for the given job.
    pub fn subscribe(&self, job_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.lock().expect("progress hub lock poisoned");
        channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }
}

#[async_trait]
impl ProgressNotifier for ProgressHub {
    async fn publish(&self, job_id: &str, event: ProgressEvent) {
        let sender = {
            let channels = self.channels.lock().expect("progress hub lock poisoned");
            channels.get(job_id).cloned()
        };
        if let Some(sender) = sender {
            // SendError only means there are zero receivers.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = ProgressHub::new();
        let mut rx = hub.subscribe("job-1");

        hub.publish(
            "job-1",
            ProgressEvent::new(JobStatus::Chunking, 10).with_message("Fetching source"),
        )
        .await;

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.status, JobStatus::Chunking);
        assert_eq!(event.progress, 10);
        assert_eq!(event.message.as_deref(), Some("Fetching source"));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let hub = ProgressHub::new();
        hub.publish("job-unseen", ProgressEvent::new(JobStatus::Failed, 0))
            .await;
    }

    #[tokio::test]
    async fn jobs_have_independent_channels() {
        let hub = ProgressHub::new();
        let mut rx_a = hub.subscribe("job-a");
        let mut rx_b = hub.subscribe("job-b");

        hub.publish("job-a", ProgressEvent::new(JobStatus::Analyzing, 50))
            .await;

        assert_eq!(
            rx_a.recv().await.expect("job-a event").progress,
            50
        );
        assert!(rx_b.try_recv().is_err(), "job-b must not see job-a events");
    }
}
