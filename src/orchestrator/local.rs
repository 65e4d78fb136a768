//! Local-mode runtime: a root-of-trust simulator container plus the
//! compose-defined workload.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use futures::StreamExt;
use tokio::process::Command;

use crate::config::LocalRuntimeConfig;
use crate::error::DeploymentError;
use crate::redact::redact_sensitive_detail;

/// Simulator port inside the container.
const SIMULATOR_CONTAINER_PORT: &str = "8090/tcp";

/// Lifecycle of the local simulator and workload.
///
/// Simulator and workload are started and stopped separately so a partially
/// started deployment can still be torn down.
#[async_trait]
pub trait LocalRuntime: Send + Sync {
    async fn start_simulator(&self) -> Result<(), DeploymentError>;

    async fn stop_simulator(&self) -> Result<(), DeploymentError>;

    async fn start_workload(&self) -> Result<(), DeploymentError>;

    async fn stop_workload(&self) -> Result<(), DeploymentError>;

    /// Base URL where the workload serves its HTTP API.
    fn deployment_url(&self) -> String;
}

/// `LocalRuntime` backed by the Docker Engine API for the simulator and the
/// compose CLI for the workload.
pub struct DockerRuntime {
    docker: Docker,
    config: LocalRuntimeConfig,
    compose_file: Option<PathBuf>,
    simulator_name: String,
}

impl DockerRuntime {
    pub fn connect(
        config: LocalRuntimeConfig,
        compose_file: Option<PathBuf>,
        app_name: &str,
    ) -> Result<Self, DeploymentError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| DeploymentError::Local {
            stage: "docker connect",
            reason: e.to_string(),
        })?;
        Ok(Self {
            docker,
            config,
            compose_file,
            simulator_name: format!("{app_name}-tappd-simulator"),
        })
    }

    async fn pull_simulator_image(&self) -> Result<(), DeploymentError> {
        let options = CreateImageOptions {
            from_image: self.config.simulator_image.clone(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            step.map_err(|e| DeploymentError::Local {
                stage: "simulator pull",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn remove_simulator_container(&self) -> Result<(), DeploymentError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .docker
            .remove_container(&self.simulator_name, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(DeploymentError::Local {
                stage: "simulator remove",
                reason: e.to_string(),
            }),
        }
    }

    fn compose_command(&self, args: &[&str]) -> Result<Command, DeploymentError> {
        let (program, leading) =
            self.config
                .compose_command
                .split_first()
                .ok_or_else(|| DeploymentError::Local {
                    stage: "compose",
                    reason: "compose command is empty".to_string(),
                })?;

        let mut command = Command::new(program);
        command.args(leading);
        if let Some(file) = &self.compose_file {
            command.arg("-f").arg(file);
        }
        command
            .args(args)
            .env("DSTACK_SIMULATOR_ENDPOINT", &self.config.simulator_endpoint)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }

    async fn run_compose(&self, stage: &'static str, args: &[&str]) -> Result<(), DeploymentError> {
        let output = self
            .compose_command(args)?
            .output()
            .await
            .map_err(|e| DeploymentError::Local {
                stage,
                reason: format!("failed to spawn compose: {e}"),
            })?;

        if output.status.success() {
            tracing::debug!(stage, "Compose step finished");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(DeploymentError::Local {
            stage,
            reason: format!(
                "{}: {}",
                output.status,
                redact_sensitive_detail(stderr.trim())
            ),
        })
    }
}

#[async_trait]
impl LocalRuntime for DockerRuntime {
    async fn start_simulator(&self) -> Result<(), DeploymentError> {
        self.pull_simulator_image().await?;
        // Leftover container from an earlier run.
        self.remove_simulator_container().await?;

        let port_bindings = HashMap::from([(
            SIMULATOR_CONTAINER_PORT.to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(self.config.simulator_port.to_string()),
            }]),
        )]);
        let config = ContainerConfig {
            image: Some(self.config.simulator_image.clone()),
            exposed_ports: Some(HashMap::from([(
                SIMULATOR_CONTAINER_PORT.to_string(),
                HashMap::new(),
            )])),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: self.simulator_name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| DeploymentError::Local {
                stage: "simulator create",
                reason: e.to_string(),
            })?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DeploymentError::Local {
                stage: "simulator start",
                reason: e.to_string(),
            })?;

        tracing::info!(
            container = %self.simulator_name,
            port = self.config.simulator_port,
            "Root-of-trust simulator started"
        );
        Ok(())
    }

    async fn stop_simulator(&self) -> Result<(), DeploymentError> {
        self.remove_simulator_container().await?;
        tracing::info!(container = %self.simulator_name, "Root-of-trust simulator stopped");
        Ok(())
    }

    async fn start_workload(&self) -> Result<(), DeploymentError> {
        self.run_compose("compose build", &["build"]).await?;
        self.run_compose("compose up", &["up", "-d"]).await?;
        tracing::info!(url = %self.config.deployment_url, "Local workload started");
        Ok(())
    }

    async fn stop_workload(&self) -> Result<(), DeploymentError> {
        self.run_compose("compose down", &["down"]).await
    }

    fn deployment_url(&self) -> String {
        self.config.deployment_url.clone()
    }
}
