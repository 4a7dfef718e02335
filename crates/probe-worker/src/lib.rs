//! Worker Pool: a bounded dequeue loop feeding task
//! pipelines, stopped gracefully on an external shutdown signal.
//!
//! Signal wiring (SIGINT/SIGTERM) lives in the `probe-worker` binary, not
//! here — this pool only consumes a `watch::Receiver<bool>`.

use std::sync::Arc;
use std::time::Duration;

use probe_engine::TaskPipeline;
use probe_queue::QueueClient;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// How long a single `BRPOP` blocks before the loop re-checks the shutdown
/// signal. Short enough that shutdown feels responsive, long enough to
/// avoid hammering the broker with polls.
const DEQUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct WorkerPool {
    pipeline: Arc<TaskPipeline>,
    queue: QueueClient,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(pipeline: TaskPipeline, queue: QueueClient, worker_count: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            queue,
            permits: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }

    /// Dequeues and dispatches tasks until `shutdown` reports `true`. Never
    /// abandons an in-flight pipeline — each spawned task is joined before
    /// `run` returns, even after the signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut in_flight = JoinSet::new();

        while !*shutdown.borrow() {
            let dequeued = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                result = self.queue.dequeue_task(DEQUEUE_POLL_TIMEOUT) => Some(result),
            };

            let Some(outcome) = dequeued else {
                break;
            };

            let task = match outcome {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "failed to dequeue a task; will retry");
                    continue;
                }
            };

            // Acquiring the permit here, before spawning, is what bounds
            // concurrency: the loop can't pull the next task until a slot
            // frees up.
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .expect("the semaphore is never closed");
            let pipeline = Arc::clone(&self.pipeline);
            let task_id = task.id;

            in_flight.spawn(async move {
                let _permit = permit;
                if let Err(e) = pipeline.run(task).await {
                    warn!(task_id = %task_id, error = %e, "pipeline failed to emit a result");
                }
            });

            while in_flight.try_join_next().is_some() {}
        }

        info!(in_flight = in_flight.len(), "draining in-flight pipelines before exit");
        while in_flight.join_next().await.is_some() {}
    }
}
