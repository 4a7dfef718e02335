//! Shared data model and configuration for the scenario worker crates.

pub mod config;
pub mod model;

pub use config::{BrokerConfig, ConfigError, DatabaseConfig, SandboxConfig, WorkerConfig};
pub use model::{Scenario, ScenarioResult, ScenarioStatus, Task, TaskResult, TaskStatus};
