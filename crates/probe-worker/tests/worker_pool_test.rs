//! End-to-end worker pool wiring. Requires a reachable Postgres, Redis, and
//! Docker daemon — the pool's collaborators have no in-memory fakes (they
//! own live connections/handles), so these run only when explicitly
//! requested, mirroring `probe-queue`'s integration tests.

use std::sync::Arc;
use std::time::Duration;

use probe_db::Provisioner;
use probe_engine::{ScenarioExecutor, TaskPipeline};
use probe_queue::QueueClient;
use probe_sandbox::ContainerSandbox;
use probe_shared::{BrokerConfig, DatabaseConfig, SandboxConfig};
use probe_worker::WorkerPool;
use tokio::sync::watch;

fn test_broker_config() -> BrokerConfig {
    BrokerConfig {
        task_queue: "probe_worker_test_task_queue".to_string(),
        results_queue: "probe_worker_test_results_queue".to_string(),
        ..BrokerConfig::default()
    }
}

#[tokio::test]
#[ignore = "requires a reachable Postgres, Redis, and Docker daemon"]
async fn pool_drains_in_flight_work_before_exiting_on_shutdown() {
    let database = DatabaseConfig::default();
    let broker = test_broker_config();
    let sandbox_config = SandboxConfig::default();

    let provisioner = Provisioner::connect(&database).await.expect("connect provisioner");
    let sandbox = ContainerSandbox::connect(sandbox_config, true).expect("connect docker");
    let queue = QueueClient::connect(&broker).await.expect("connect broker");
    let executor = ScenarioExecutor::new(Duration::from_secs(5)).expect("build executor");

    let pipeline = TaskPipeline::new(
        Arc::new(provisioner),
        Arc::new(sandbox),
        executor,
        Arc::new(queue.clone()),
        database,
    );
    let pool = WorkerPool::new(pipeline, queue, 2);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    // An already-true shutdown signal should make `run` return immediately
    // without blocking on a dequeue.
    tokio::time::timeout(Duration::from_secs(5), pool.run(shutdown_rx))
        .await
        .expect("pool.run should return promptly once shutdown is already set");
}
