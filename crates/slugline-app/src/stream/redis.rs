//! Redis Streams backend.
//!
//! Entries carry the serialized payload under a single `data` field.
//! Group creation uses `MKSTREAM` and tolerates `BUSYGROUP` so every worker
//! process can ensure its group on startup.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::Value;

use super::{DurableStream, MessageId, StreamEntry, StreamError};

const DATA_FIELD: &str = "data";

#[derive(Clone)]
pub struct RedisStream {
    conn: MultiplexedConnection,
}

impl RedisStream {
    pub async fn connect(url: &str) -> Result<Self, StreamError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl DurableStream for RedisStream {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP means the group already exists.
            Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn append(
        &self,
        stream: &str,
        data: &serde_json::Value,
    ) -> Result<MessageId, StreamError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(data)?;
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg(DATA_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<StreamEntry>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        parse_read_reply(reply)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _acked: i64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Unpack `[[stream, [[id, [field, value, ...]]]]]` into the first entry's
/// `data` payload.
fn parse_read_reply(reply: Value) -> Result<Option<StreamEntry>, StreamError> {
    let streams = match reply {
        Value::Nil => return Ok(None),
        Value::Array(streams) => streams,
        other => return Err(StreamError::Malformed(format!("{other:?}"))),
    };

    for stream in streams {
        let Value::Array(stream_data) = stream else {
            continue;
        };
        if stream_data.len() < 2 {
            continue;
        }
        let Value::Array(entries) = &stream_data[1] else {
            continue;
        };
        for entry in entries {
            let Value::Array(parts) = entry else { continue };
            if parts.len() < 2 {
                continue;
            }
            let Value::BulkString(id) = &parts[0] else {
                continue;
            };
            let id = String::from_utf8_lossy(id).to_string();
            let Value::Array(fields) = &parts[1] else {
                continue;
            };
            let mut iter = fields.iter();
            while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                let (Value::BulkString(key), Value::BulkString(value)) = (key, value) else {
                    continue;
                };
                if key.as_slice() == DATA_FIELD.as_bytes() {
                    let data = serde_json::from_slice(value)?;
                    return Ok(Some(StreamEntry { id, data }));
                }
            }
            return Err(StreamError::Malformed(format!(
                "entry {id} has no `{DATA_FIELD}` field"
            )));
        }
    }

    Ok(None)
}
