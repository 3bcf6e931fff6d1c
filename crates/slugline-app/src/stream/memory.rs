//! In-memory stream backend with consumer-group accounting.
//!
//! Used by tests and the `memory` runtime backend. Semantics mirror the
//! Redis backend closely enough to exercise the workers: one shared cursor
//! per group, pending-until-ack bookkeeping, and a bounded blocking read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{DurableStream, MessageId, StreamEntry, StreamError};

#[derive(Default)]
struct GroupState {
    /// Index of the next entry not yet delivered to any group member.
    cursor: usize,
    /// Delivered-but-unacknowledged message ids.
    pending: Vec<MessageId>,
    /// How many times each id has been acknowledged.
    ack_counts: HashMap<MessageId, u32>,
}

#[derive(Default)]
struct StreamState {
    entries: Vec<(MessageId, serde_json::Value)>,
    groups: HashMap<String, GroupState>,
    next_seq: u64,
}

#[derive(Default)]
pub struct MemoryStream {
    streams: Mutex<HashMap<String, StreamState>>,
    appended: Notify,
}

impl MemoryStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of entries ever appended to a stream.
    pub async fn len(&self, stream: &str) -> usize {
        let streams = self.streams.lock().await;
        streams.get(stream).map_or(0, |s| s.entries.len())
    }

    pub async fn is_empty(&self, stream: &str) -> bool {
        self.len(stream).await == 0
    }

    /// How many times the given message id was acknowledged by the group.
    pub async fn ack_count(&self, stream: &str, group: &str, id: &str) -> u32 {
        let streams = self.streams.lock().await;
        streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .and_then(|g| g.ack_counts.get(id).copied())
            .unwrap_or(0)
    }

    async fn try_read(&self, stream: &str, group: &str) -> Option<StreamEntry> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(stream.to_string()).or_default();
        let cursor = state
            .groups
            .get(group)
            .map(|g| g.cursor)
            .unwrap_or_default();
        if cursor >= state.entries.len() {
            return None;
        }
        let (id, data) = state.entries[cursor].clone();
        let group_state = state.groups.entry(group.to_string()).or_default();
        group_state.cursor = cursor + 1;
        group_state.pending.push(id.clone());
        Some(StreamEntry { id, data })
    }
}

#[async_trait::async_trait]
impl DurableStream for MemoryStream {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(stream.to_string()).or_default();
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn append(
        &self,
        stream: &str,
        data: &serde_json::Value,
    ) -> Result<MessageId, StreamError> {
        let id = {
            let mut streams = self.streams.lock().await;
            let state = streams.entry(stream.to_string()).or_default();
            state.next_seq += 1;
            let id = format!("{}-0", state.next_seq);
            state.entries.push((id.clone(), data.clone()));
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        block: Duration,
    ) -> Result<Option<StreamEntry>, StreamError> {
        let deadline = Instant::now() + block;
        loop {
            if let Some(entry) = self.try_read(stream, group).await {
                return Ok(Some(entry));
            }
            let notified = self.appended.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut streams = self.streams.lock().await;
        let state = streams.entry(stream.to_string()).or_default();
        let group_state = state.groups.entry(group.to_string()).or_default();
        group_state.pending.retain(|pending| pending != id);
        *group_state.ack_counts.entry(id.to_string()).or_insert(0) += 1;
        Ok(())
    }
}
