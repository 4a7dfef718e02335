//! Worker process entry point: CLI parsing, configuration load, and signal
//! wiring. The pool itself only exposes a `watch`-channel shutdown hook —
//! SIGINT/SIGTERM handling is an external concern.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use probe_db::Provisioner;
use probe_engine::{ScenarioExecutor, TaskPipeline};
use probe_queue::QueueClient;
use probe_sandbox::ContainerSandbox;
use probe_shared::WorkerConfig;
use probe_worker::WorkerPool;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Task execution worker: provisions a principal and a container sandbox
/// per task, runs scenarios in dependency order, and emits one result.
#[derive(Parser)]
#[command(name = "probe-worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of concurrent task pipelines. Defaults to available CPUs.
    #[arg(long)]
    processes: Option<usize>,

    /// Path to a TOML config file, overriding PROBE_CONFIG_PATH.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("probe_worker=info".parse()?))
        .init();

    let cli = Cli::parse();
    if let Some(path) = &cli.config {
        std::env::set_var("PROBE_CONFIG_PATH", path);
    }

    let mut config = WorkerConfig::load().context("failed to load worker configuration")?;
    if let Some(processes) = cli.processes {
        config.worker_count = Some(processes);
    }
    let worker_count = config.worker_count.unwrap_or_else(available_parallelism);

    let provisioner = Provisioner::connect(&config.database)
        .await
        .context("failed to connect the principal provisioner")?;
    let sandbox = ContainerSandbox::connect(config.sandbox.clone(), WorkerConfig::host_mode())
        .context("failed to connect to the container runtime")?;
    let queue = QueueClient::connect(&config.broker)
        .await
        .context("failed to connect to the broker")?;
    let executor = ScenarioExecutor::new(config.scenario_timeout())
        .context("failed to build the scenario HTTP client")?;

    let pipeline = TaskPipeline::new(
        Arc::new(provisioner),
        Arc::new(sandbox),
        executor,
        Arc::new(queue.clone()),
        config.database.clone(),
    );

    let pool = WorkerPool::new(pipeline, queue, worker_count);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_shutdown_signal(shutdown_tx));

    tracing::info!(worker_count, "probe-worker started");
    pool.run(shutdown_rx).await;
    tracing::info!("probe-worker stopped");

    Ok(())
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install a SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install a SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c");
    }
    let _ = shutdown_tx.send(true);
}
