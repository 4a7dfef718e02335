//! Layered worker configuration.
//!
//! Precedence (lowest to highest): built-in defaults, an optional TOML file
//! (`PROBE_CONFIG_PATH`, default `./probe.toml`), then `PROBE_`-prefixed
//! environment variables (`__` separates nested keys, e.g.
//! `PROBE_DATABASE__HOST`).

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// The privileged database used to run CREATE/DROP USER statements.
    pub admin_db: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            admin_db: "postgres".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub task_queue: String,
    pub results_queue: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            task_queue: "task_queue".to_string(),
            results_queue: "scenario_results_queue".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{host}:{port}/{db}",
                host = self.host,
                port = self.port,
                db = self.db
            ),
            None => format!("redis://{host}:{port}/{db}", host = self.host, port = self.port, db = self.db),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Docker network the sandbox container joins.
    pub network: String,
    /// Fixed post-start readiness wait, in seconds.
    pub readiness_wait_secs: u64,
    pub container_port: u16,
    pub host_port: u16,
    pub stop_timeout_secs: u64,
    pub settle_wait_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            network: "dbs_network".to_string(),
            readiness_wait_secs: 15,
            container_port: 8000,
            host_port: 9050,
            stop_timeout_secs: 5,
            settle_wait_secs: 5,
        }
    }
}

impl SandboxConfig {
    pub fn readiness_wait(&self) -> Duration {
        Duration::from_secs(self.readiness_wait_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn settle_wait(&self) -> Duration {
        Duration::from_secs(self.settle_wait_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub sandbox: SandboxConfig,
    /// Per-scenario HTTP timeout, in seconds.
    pub scenario_timeout_secs: u64,
    /// Worker pool size; `None` means "use available CPU count".
    pub worker_count: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            broker: BrokerConfig::default(),
            sandbox: SandboxConfig::default(),
            scenario_timeout_secs: 30,
            worker_count: None,
        }
    }
}

impl WorkerConfig {
    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_secs(self.scenario_timeout_secs)
    }

    /// Load configuration from defaults, an optional file, then environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("PROBE_CONFIG_PATH").unwrap_or_else(|_| "probe.toml".to_string());

        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("database.host", defaults.database.host)?
            .set_default("database.port", i64::from(defaults.database.port))?
            .set_default("database.user", defaults.database.user)?
            .set_default("database.password", defaults.database.password)?
            .set_default("database.admin_db", defaults.database.admin_db)?
            .set_default("broker.host", defaults.broker.host)?
            .set_default("broker.port", i64::from(defaults.broker.port))?
            .set_default("broker.db", defaults.broker.db)?
            .set_default("broker.task_queue", defaults.broker.task_queue)?
            .set_default("broker.results_queue", defaults.broker.results_queue)?
            .set_default("sandbox.network", defaults.sandbox.network)?
            .set_default(
                "sandbox.readiness_wait_secs",
                defaults.sandbox.readiness_wait_secs as i64,
            )?
            .set_default(
                "sandbox.container_port",
                i64::from(defaults.sandbox.container_port),
            )?
            .set_default("sandbox.host_port", i64::from(defaults.sandbox.host_port))?
            .set_default(
                "sandbox.stop_timeout_secs",
                defaults.sandbox.stop_timeout_secs as i64,
            )?
            .set_default(
                "sandbox.settle_wait_secs",
                defaults.sandbox.settle_wait_secs as i64,
            )?
            .set_default("scenario_timeout_secs", defaults.scenario_timeout_secs as i64)?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("PROBE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Host-mode is selected by the *absence* of the `DOCKER` env var.
    pub fn host_mode() -> bool {
        std::env::var_os("DOCKER").is_none()
    }
}
