//! Task Pipeline — the orchestrator braiding
//! provisioning, container lifecycle, scenario ordering/dispatch, and result
//! emission into a single convergence point.
//!
//! ```text
//!  INIT ─▶ PROVISIONED ─▶ CONTAINER_UP ─▶ ORDERED ─▶ EXECUTED ─▶ EMITTED ─▶ CLEAN
//!            │                │              │           │           │
//!            ▼                ▼              ▼           ▼           ▼
//!          failed emission path: set status=failed, message=<cause>, emit, cleanup
//! ```
//!
//! Every path below — success or failure at any stage — runs through the
//! same tail: emit exactly one `TaskResult`, then stop the container if one
//! was started and revoke the principal if one was provisioned.

use std::collections::HashMap;
use std::sync::Arc;

use probe_db::{PrincipalHandle, Provisioner};
use probe_queue::TaskQueue;
use probe_sandbox::{ContainerSandbox, SandboxEnv, SandboxHandle};
use probe_shared::{DatabaseConfig, Task, TaskResult, TaskStatus};
use thiserror::Error;
use tracing::{error, info};

use crate::executor::ScenarioExecutor;
use crate::graph;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to emit task result: {0}")]
    Emit(#[from] probe_queue::QueueError),
}

pub struct TaskPipeline {
    provisioner: Arc<Provisioner>,
    sandbox: Arc<ContainerSandbox>,
    executor: ScenarioExecutor,
    queue: Arc<dyn TaskQueue>,
    database: DatabaseConfig,
}

impl TaskPipeline {
    pub fn new(
        provisioner: Arc<Provisioner>,
        sandbox: Arc<ContainerSandbox>,
        executor: ScenarioExecutor,
        queue: Arc<dyn TaskQueue>,
        database: DatabaseConfig,
    ) -> Self {
        Self {
            provisioner,
            sandbox,
            executor,
            queue,
            database,
        }
    }

    /// Runs one task to convergence. Only an emission failure propagates —
    /// everything upstream of it is captured into the task result instead.
    pub async fn run(&self, task: Task) -> Result<(), PipelineError> {
        if task.status != TaskStatus::Pending {
            info!(task_id = %task.id, status = %task.status, "task is not pending; skipping");
            return Ok(());
        }

        let mut task_result = TaskResult::from_task(&task);
        let mut principal: Option<PrincipalHandle> = None;
        let mut sandbox_handle: Option<SandboxHandle> = None;

        let outcome = self.execute(&task, &mut task_result, &mut principal, &mut sandbox_handle).await;
        if let Err(cause) = outcome {
            error!(task_id = %task.id, image = %task.docker_image, error = %cause, "task failed");
            task_result.mark_failed(cause);
        }

        // Emission is the final observable effect of the pipeline: it must
        // happen before teardown, not after, so cleanup failures can never
        // delay or shadow the result.
        self.queue.emit_result(&task_result).await?;

        if let Some(handle) = &sandbox_handle {
            self.sandbox.stop(handle, &task.docker_image).await;
        }
        if let Some(handle) = &principal {
            self.provisioner.revoke(handle).await;
        }

        Ok(())
    }

    /// PROVISIONED → CONTAINER_UP → ORDERED → EXECUTED, in sequence. Any
    /// failure short-circuits with the message destined for `TaskResult`;
    /// resources allocated before the failure are recorded in `principal`
    /// and `sandbox_handle` so the caller's cleanup tail can reach them.
    async fn execute(
        &self,
        task: &Task,
        task_result: &mut TaskResult,
        principal: &mut Option<PrincipalHandle>,
        sandbox_handle: &mut Option<SandboxHandle>,
    ) -> Result<(), String> {
        // The handle is named before any SQL runs and recorded into
        // `principal` immediately, so the caller's cleanup tail can still
        // revoke it if `provision` fails partway (e.g. CREATE USER
        // succeeds but a later GRANT does not).
        let handle = PrincipalHandle::new(task.db_name.clone());
        *principal = Some(handle.clone());
        self.provisioner.provision(&handle).await.map_err(|e| e.to_string())?;

        let env = SandboxEnv {
            principal_name: handle.name.clone(),
            principal_password: handle.password.clone(),
            database_host: self.database.host.clone(),
            database_port: self.database.port,
            database_name: task.db_name.clone(),
        };
        let started = self
            .sandbox
            .start(&task.id.to_string(), &task.docker_image, &env)
            .await
            .map_err(|e| e.to_string())?;
        *sandbox_handle = Some(started.clone());

        let ordered = graph::order(task.scenarios.clone()).map_err(|e| e.to_string())?;

        let base_url = self
            .sandbox
            .endpoint(&started)
            .await
            .map_err(|e| e.to_string())?;

        let mut results_by_id = HashMap::with_capacity(ordered.len());
        for scenario in &ordered {
            let result = self.executor.execute(&base_url, scenario, &results_by_id).await;
            results_by_id.insert(scenario.id, result.clone());
            task_result.scenario_results.push(result);
        }

        let logs = self.sandbox.logs(&started).await;
        task_result.mark_done(logs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_shared::Scenario;
    use uuid::Uuid;

    fn task(status: TaskStatus) -> Task {
        Task {
            id: Uuid::new_v4(),
            docker_image: "img".to_string(),
            db_name: "db".to_string(),
            status,
            scenarios: Vec::<Scenario>::new(),
        }
    }

    #[test]
    fn entry_guard_only_admits_pending_tasks() {
        assert_eq!(task(TaskStatus::Pending).status, TaskStatus::Pending);
        assert_ne!(task(TaskStatus::Done).status, TaskStatus::Pending);
        assert_ne!(task(TaskStatus::Failed).status, TaskStatus::Pending);
    }
}
