//! Single-use container lifecycle, via the Docker
//! Engine API (`bollard`).

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::image::RemoveImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use probe_shared::SandboxConfig;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),

    #[error("container {0} has no network address yet")]
    NoNetworkAddress(String),
}

/// Environment handed to the container under test.
#[derive(Debug, Clone)]
pub struct SandboxEnv {
    pub principal_name: String,
    pub principal_password: String,
    pub database_host: String,
    pub database_port: u16,
    pub database_name: String,
}

#[derive(Debug, Clone)]
pub struct SandboxHandle {
    /// Equal to the task id.
    pub container_name: String,
    pub container_id: String,
}

pub struct ContainerSandbox {
    docker: Docker,
    config: SandboxConfig,
    host_mode: bool,
}

impl std::fmt::Debug for ContainerSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSandbox")
            .field("network", &self.config.network)
            .field("host_mode", &self.host_mode)
            .finish()
    }
}

impl ContainerSandbox {
    pub fn connect(config: SandboxConfig, host_mode: bool) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self {
            docker,
            config,
            host_mode,
        })
    }

    /// Launch `image` detached, named by `task_id`, and wait the fixed
    /// readiness window before returning.
    pub async fn start(
        &self,
        task_id: &str,
        image: &str,
        env: &SandboxEnv,
    ) -> Result<SandboxHandle, SandboxError> {
        let env_vars = vec![
            "NAME=Arthur".to_string(),
            format!("DATABASE_HOST={}", env.database_host),
            format!("DATABASE_PORT={}", env.database_port),
            format!("DATABASE_NAME={}", env.database_name),
            format!("DATABASE_USER={}", env.principal_name),
            format!("DATABASE_PASSWORD={}", env.principal_password),
        ];

        let extra_hosts = vec![
            "host.docker.internal:host-gateway".to_string(),
            "docker.for.mac.localhost:host-gateway".to_string(),
        ];

        let mut host_config = HostConfig {
            privileged: Some(false),
            network_mode: Some(self.config.network.clone()),
            extra_hosts: Some(extra_hosts),
            ..Default::default()
        };

        if self.host_mode {
            let mut port_bindings = HashMap::new();
            port_bindings.insert(
                format!("{}/tcp", self.config.container_port),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(self.config.host_port.to_string()),
                }]),
            );
            host_config.port_bindings = Some(port_bindings);
        }

        let container_config = Config {
            image: Some(image.to_string()),
            env: Some(env_vars),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: task_id.to_string(),
            platform: None,
        };
        let created = self
            .docker
            .create_container(Some(options), container_config)
            .await?;
        self.docker
            .start_container::<String>(&created.id, None)
            .await?;

        tokio::time::sleep(self.config.readiness_wait()).await;

        Ok(SandboxHandle {
            container_name: task_id.to_string(),
            container_id: created.id,
        })
    }

    /// Base URL for the sandboxed service.
    pub async fn endpoint(&self, handle: &SandboxHandle) -> Result<String, SandboxError> {
        if self.host_mode {
            return Ok(format!("http://127.0.0.1:{}", self.config.host_port));
        }

        let inspect = self
            .docker
            .inspect_container(&handle.container_id, None)
            .await?;
        let ip = inspect
            .network_settings
            .as_ref()
            .and_then(|settings| settings.networks.as_ref())
            .and_then(|networks| networks.get(&self.config.network))
            .and_then(|network| network.ip_address.clone())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| SandboxError::NoNetworkAddress(handle.container_name.clone()))?;

        Ok(format!("http://{ip}:{}", self.config.container_port))
    }

    /// Captured container standard output. Must be called before `stop` —
    /// logs are unavailable once the container is removed.
    pub async fn logs(&self, handle: &SandboxHandle) -> String {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        });
        let mut stream = self.docker.logs(&handle.container_id, options);
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(log) => output.push_str(&log.to_string()),
                Err(e) => {
                    warn!(error = %e, container = %handle.container_name, "error reading container logs");
                    break;
                }
            }
        }
        output
    }

    /// Graceful stop, force-remove, then best-effort image removal.
    pub async fn stop(&self, handle: &SandboxHandle, image: &str) {
        let stop_options = StopContainerOptions {
            t: self.config.stop_timeout_secs as i64,
        };
        if let Err(e) = self
            .docker
            .stop_container(&handle.container_id, Some(stop_options))
            .await
        {
            warn!(error = %e, container = %handle.container_name, "failed to stop container");
        }

        tokio::time::sleep(self.config.settle_wait()).await;

        let remove_options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self
            .docker
            .remove_container(&handle.container_id, Some(remove_options))
            .await
        {
            warn!(error = %e, container = %handle.container_name, "failed to remove container");
        }

        let image_options = Some(RemoveImageOptions {
            force: true,
            ..Default::default()
        });
        match self.docker.remove_image(image, image_options, None).await {
            Ok(_) => {}
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => warn!(error = %e, image, "failed to remove image"),
        }
    }
}
