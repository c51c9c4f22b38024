use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{Job, JobType};

fn queue_key(queue: &str) -> String {
    format!("queue:{queue}")
}

fn processing_key(queue: &str, worker_id: &str) -> String {
    format!("queue:{queue}:processing:{worker_id}")
}

/// Dispatch message for a due job, serialized into Redis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub queue: String,
    pub payload: Vec<u8>,
}

impl From<&Job> for QueuedJob {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            queue: job.queue.clone(),
            payload: job.payload.clone(),
        }
    }
}

/// Dispatch channel between "a job became due" and "a worker executes it".
///
/// Delivery is at-least-once: a pulled message stays in the puller's
/// processing list until acknowledged.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push_job(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Pull one message, waiting at most `wait` for one to arrive.
    async fn pull_job(&self, queue: &str, wait: Duration) -> Result<Option<QueuedJob>, QueueError>;

    /// Drop a handled message from the processing list.
    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Move unacknowledged messages of this worker back onto the queue.
    async fn recover(&self, queue: &str) -> Result<u64, QueueError>;

    async fn depth(&self, queue: &str) -> Result<u64, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}

/// Redis-backed work queue using the reliable-queue pattern.
pub struct RedisWorkQueue {
    client: redis::Client,
    worker_id: String,
}

impl RedisWorkQueue {
    pub fn new(redis_url: &str, worker_id: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            worker_id: worker_id.into(),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn push_job(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(queue_key(&job.queue), &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn pull_job(&self, queue: &str, wait: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.connection().await?;
        // Whole seconds; zero would block forever.
        let wait_secs = wait.as_secs().max(1);
        let result: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(queue_key(queue))
            .arg(processing_key(queue, &self.worker_id))
            .arg(wait_secs)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedJob = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(processing_key(&job.queue, &self.worker_id), 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let processing = processing_key(queue, &self.worker_id);
        let mut moved = 0;
        loop {
            let item: Option<String> = conn
                .rpoplpush(&processing, queue_key(queue))
                .await
                .map_err(QueueError::Redis)?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(queue_key(queue)).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
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
