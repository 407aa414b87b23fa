use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::JobId;

const QUEUE_KEY: &str = "weather:jobs";
const PROCESSING_KEY: &str = "weather:processing";
pub const DEAD_LETTER_KEY: &str = "weather:dead";

/// Work message handed from the API to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub task_id: Uuid,
    pub cities: Vec<String>,
}

impl QueuedJob {
    pub fn new(job_id: JobId, cities: Vec<String>) -> Self {
        Self {
            job_id,
            task_id: Uuid::new_v4(),
            cities,
        }
    }
}

/// Hands a job to whatever will execute it. Delivery is at-least-once.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed work queue with a processing list for in-flight jobs.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a weather job.
    pub async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Dequeue a job for processing, moving it onto the processing list.
    pub async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        let Some(payload) = result else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedJob>(&payload) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                // Unreadable messages can never be completed, so park them.
                redis::pipe()
                    .atomic()
                    .lrem(PROCESSING_KEY, 1, &payload)
                    .ignore()
                    .lpush(DEAD_LETTER_KEY, &payload)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(QueueError::Redis)?;
                tracing::error!(error = %e, "Moved unreadable queue message to dead-letter list");
                Err(QueueError::Serialize(e))
            }
        }
    }

    /// Get the current queue depth (pending jobs).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    /// Mark a job as complete (remove from the processing list).
    pub async fn complete(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.enqueue(job).await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let job = QueuedJob::new(12, vec!["London".into(), "Paris".into()]);
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["job_id"], 12);
        assert_eq!(json["cities"], serde_json::json!(["London", "Paris"]));
        assert!(json["task_id"].is_string());
    }

    #[test]
    fn test_payload_is_stable_for_processing_list_removal() {
        // `complete` removes by exact payload, so re-serializing a dequeued
        // job must reproduce the enqueued bytes.
        let job = QueuedJob::new(3, vec!["Oslo".into()]);
        let payload = serde_json::to_string(&job).unwrap();
        let decoded: QueuedJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(serde_json::to_string(&decoded).unwrap(), payload);
    }
}
