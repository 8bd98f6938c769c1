//! pgmq queue operations via direct SQLx, and the pgmq-backed [`QueueClient`].
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.pop,
//! pgmq.metrics.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::debug;

use super::Db;
use crate::error::Result;
use crate::model::WorkItem;
use crate::queue::QueueClient;
use crate::telemetry::metrics;

/// A message removed from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

fn record_op(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(self.pool())
            .await?;
        record_op(queue_name, "create");
        Ok(())
    }

    /// Append a message to the tail of a queue. Returns the message ID.
    pub async fn send_to_queue(&self, queue_name: &str, payload: &serde_json::Value) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, 0)")
            .bind(queue_name)
            .bind(payload)
            .fetch_one(self.pool())
            .await?;
        record_op(queue_name, "send");
        Ok(row.0)
    }

    /// Read and delete the oldest message in one step.
    /// Returns None if the queue is empty.
    pub async fn pop_from_queue(&self, queue_name: &str) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.pop($1)")
        .bind(queue_name)
        .fetch_optional(self.pool())
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            message,
        });

        record_op(queue_name, if msg.is_some() { "pop" } else { "pop_empty" });
        Ok(msg)
    }

    /// Number of messages currently in the queue.
    pub async fn queue_length(&self, queue_name: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }
}

/// A named pgmq queue carrying `{"url": ...}` messages.
#[derive(Debug, Clone)]
pub struct PgmqQueue {
    db: Db,
    name: String,
}

impl PgmqQueue {
    pub fn new(db: Db, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl QueueClient for PgmqQueue {
    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await
    }

    async fn pop(&self) -> Result<Option<WorkItem>> {
        match self.db.pop_from_queue(&self.name).await? {
            Some(msg) => {
                debug!(
                    queue = %self.name,
                    msg_id = msg.msg_id,
                    read_ct = msg.read_ct,
                    enqueued_at = %msg.enqueued_at,
                    "popped message"
                );
                WorkItem::from_payload(msg.message).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn push(&self, item: &WorkItem) -> Result<()> {
        self.db.send_to_queue(&self.name, &item.to_payload()).await?;
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        let len = self.db.queue_length(&self.name).await?;
        Ok(len.max(0) as u64)
    }
}
