//! Redis-backed task queue / results queue client.
//!
//! Consumers right-pop (`BRPOP`) the task queue; producers left-push
//! (`LPUSH`) the results queue. Both queue names are configurable but
//! default to the fixed names `task_queue` and `scenario_results_queue`.

use std::time::Duration;

use async_trait::async_trait;
use probe_shared::{BrokerConfig, Task, TaskResult};
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection failed: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("task payload was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The pipeline's broker seam, so a test can swap in an in-memory fake
/// instead of a live Redis connection.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn dequeue_task(&self, poll_timeout: Duration) -> Result<Option<Task>, QueueError>;
    async fn emit_result(&self, result: &TaskResult) -> Result<(), QueueError>;
}

/// A cloneable handle to the task/results broker.
///
/// Wraps `redis::aio::ConnectionManager`, which reconnects transparently on
/// connection loss, so every pipeline can hold its own cheap clone without
/// a shared mutex.
#[derive(Debug, Clone)]
pub struct QueueClient {
    manager: redis::aio::ConnectionManager,
    task_queue: String,
    results_queue: String,
}

impl QueueClient {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.redis_url())?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            manager,
            task_queue: config.task_queue.clone(),
            results_queue: config.results_queue.clone(),
        })
    }

    /// Block up to `poll_timeout` for a task on the task queue. Returns
    /// `Ok(None)` on a timed-out poll (no task available), which lets the
    /// worker pool re-check its shutdown signal between polls.
    pub async fn dequeue_task(&self, poll_timeout: Duration) -> Result<Option<Task>, QueueError> {
        let mut conn = self.manager.clone();
        let timeout_secs = poll_timeout.as_secs().max(1);
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.task_queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match reply {
            Some((_key, payload)) => {
                let task: Task = serde_json::from_str(&payload)?;
                debug!(task_id = %task.id, "dequeued task");
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Left-push exactly one task result onto the results queue. This is the
    /// sole emission point for a pipeline invocation.
    pub async fn emit_result(&self, result: &TaskResult) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let payload = serde_json::to_string(result)?;
        let _: i64 = conn.lpush(&self.results_queue, payload).await?;
        debug!(task_id = %result.id, status = %result.status, "emitted task result");
        Ok(())
    }

    /// Push a raw task payload — used by tests and by controllers embedding
    /// this crate to enqueue work.
    pub async fn enqueue_task(&self, task: &Task) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let payload = serde_json::to_string(task)?;
        let len: i64 = conn.lpush(&self.task_queue, payload).await?;
        if len > 1000 {
            warn!(queue = %self.task_queue, depth = len, "task queue depth is large");
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for QueueClient {
    async fn dequeue_task(&self, poll_timeout: Duration) -> Result<Option<Task>, QueueError> {
        QueueClient::dequeue_task(self, poll_timeout).await
    }

    async fn emit_result(&self, result: &TaskResult) -> Result<(), QueueError> {
        QueueClient::emit_result(self, result).await
    }
}
