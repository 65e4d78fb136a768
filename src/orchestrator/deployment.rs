use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::{Config, ControlPlaneConfig, DeploymentConfig};
use crate::control_plane::{ControlPlaneClient, VmConfiguration};
use crate::error::{ConfigError, DeploymentError};
use crate::instance::{InitializeRequest, InstanceClient};
use crate::orchestrator::health::wait_until_ready;
use crate::orchestrator::local::{DockerRuntime, LocalRuntime};
use crate::secrets::encrypt_secrets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Stopped,
    Starting,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Local,
    Cloud,
}

/// The single deployment tracked by an orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRecord {
    pub instance_id: Option<String>,
    pub deployment_url: Option<String>,
    pub dashboard_url: Option<String>,
    pub status: DeploymentStatus,
    pub mode: DeploymentMode,
    pub started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    fn stopped(mode: DeploymentMode) -> Self {
        Self {
            instance_id: None,
            deployment_url: None,
            dashboard_url: None,
            status: DeploymentStatus::Stopped,
            mode,
            started_at: None,
            ready_at: None,
        }
    }
}

/// Where instances are launched.
pub enum DeploymentBackend {
    Local(Arc<dyn LocalRuntime>),
    Cloud(ControlPlaneClient),
}

impl DeploymentBackend {
    fn mode(&self) -> DeploymentMode {
        match self {
            Self::Local(_) => DeploymentMode::Local,
            Self::Cloud(_) => DeploymentMode::Cloud,
        }
    }
}

/// Local resources that `stop()` still has to release.
#[derive(Debug, Default)]
struct LocalResources {
    simulator: bool,
    workload: bool,
}

struct State {
    record: DeploymentRecord,
    local: LocalResources,
}

/// Owns the lifecycle of one deployment.
///
/// `start()` and `stop()` are serialized by an internal lock; concurrent
/// callers wait for the in-flight operation and then observe its result.
pub struct DeploymentOrchestrator {
    backend: DeploymentBackend,
    config: DeploymentConfig,
    control_plane: ControlPlaneConfig,
    http: reqwest::Client,
    lifecycle: Mutex<()>,
    state: RwLock<State>,
}

impl DeploymentOrchestrator {
    pub fn new(
        backend: DeploymentBackend,
        config: DeploymentConfig,
        control_plane: ControlPlaneConfig,
    ) -> Self {
        let mode = backend.mode();
        Self {
            backend,
            config,
            control_plane,
            http: reqwest::Client::new(),
            lifecycle: Mutex::new(()),
            state: RwLock::new(State {
                record: DeploymentRecord::stopped(mode),
                local: LocalResources::default(),
            }),
        }
    }

    /// Cloud mode when a control-plane key is configured, local otherwise.
    pub fn from_config(config: &Config) -> Result<Self, DeploymentError> {
        let backend = if config.control_plane.cloud_enabled() {
            DeploymentBackend::Cloud(ControlPlaneClient::new(&config.control_plane)?)
        } else {
            DeploymentBackend::Local(Arc::new(DockerRuntime::connect(
                config.deployment.local.clone(),
                config.deployment.compose_file.clone(),
                &config.deployment.app_name,
            )?))
        };
        Ok(Self::new(
            backend,
            config.deployment.clone(),
            config.control_plane.clone(),
        ))
    }

    pub fn mode(&self) -> DeploymentMode {
        self.backend.mode()
    }

    pub async fn record(&self) -> DeploymentRecord {
        self.state.read().await.record.clone()
    }

    pub async fn is_running(&self) -> bool {
        matches!(
            self.state.read().await.record.status,
            DeploymentStatus::Starting | DeploymentStatus::Ready
        )
    }

    /// Launch an instance and wait until its health endpoint reports ready.
    ///
    /// No-op when a deployment is already starting or ready. Any failure
    /// leaves the record in `Failed`; cleanup is left to `stop()`.
    pub async fn start(&self) -> Result<DeploymentRecord, DeploymentError> {
        let _guard = self.lifecycle.lock().await;

        {
            let mut state = self.state.write().await;
            if matches!(
                state.record.status,
                DeploymentStatus::Starting | DeploymentStatus::Ready
            ) {
                tracing::debug!(status = ?state.record.status, "Deployment already running");
                return Ok(state.record.clone());
            }
            state.record = DeploymentRecord {
                status: DeploymentStatus::Starting,
                started_at: Some(Utc::now()),
                ..DeploymentRecord::stopped(self.backend.mode())
            };
        }

        tracing::info!(mode = ?self.backend.mode(), app = %self.config.app_name, "Starting deployment");

        let launched = match &self.backend {
            DeploymentBackend::Local(runtime) => self.launch_local(runtime.as_ref()).await,
            DeploymentBackend::Cloud(client) => self.launch_cloud(client).await,
        };
        let ready = match launched {
            Ok(url) => {
                self.state.write().await.record.deployment_url = Some(url.clone());
                wait_until_ready(
                    &self.http,
                    &url,
                    self.config.health_timeout,
                    &self.config.readiness_backoff,
                )
                .await
            }
            Err(e) => Err(e),
        };

        let mut state = self.state.write().await;
        match ready {
            Ok(()) => {
                state.record.status = DeploymentStatus::Ready;
                state.record.ready_at = Some(Utc::now());
                tracing::info!(
                    instance_id = ?state.record.instance_id,
                    url = ?state.record.deployment_url,
                    "Deployment ready"
                );
                Ok(state.record.clone())
            }
            Err(e) => {
                state.record.status = DeploymentStatus::Failed;
                tracing::error!(error = %e, "Deployment failed");
                Err(e)
            }
        }
    }

    async fn launch_local(&self, runtime: &dyn LocalRuntime) -> Result<String, DeploymentError> {
        runtime.start_simulator().await?;
        self.state.write().await.local.simulator = true;

        // Marked before the call so a half-started stack is still torn down.
        self.state.write().await.local.workload = true;
        runtime.start_workload().await?;

        Ok(runtime.deployment_url())
    }

    async fn launch_cloud(&self, client: &ControlPlaneClient) -> Result<String, DeploymentError> {
        let compose = self.load_compose_file().await?;
        let vm_config = VmConfiguration::new(&self.config, compose);

        let attestation = client.fetch_attestation_pubkey(&vm_config).await?;
        let bundle = encrypt_secrets(&self.config.deploy_env, &attestation.encryption_public_key)?;
        tracing::debug!(
            secrets = self.config.deploy_env.len(),
            "Deploy-time secrets sealed to attestation key"
        );

        let instance_id = client
            .create_instance(&vm_config, &bundle, &attestation)
            .await?;
        let dashboard_url = self.control_plane.dashboard_link(&instance_id);
        tracing::info!(%instance_id, dashboard = %dashboard_url, "Instance created");
        {
            let mut state = self.state.write().await;
            state.record.instance_id = Some(instance_id.clone());
            state.record.dashboard_url = Some(dashboard_url);
        }

        self.poll_deployment_url(client, &instance_id).await
    }

    /// Sleep, then query, until a public URL is assigned. Transient errors
    /// count as "not yet".
    async fn poll_deployment_url(
        &self,
        client: &ControlPlaneClient,
        instance_id: &str,
    ) -> Result<String, DeploymentError> {
        let policy = &self.config.deployment_backoff;
        for attempt in 0..policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;

            match client.poll_network_status(instance_id).await {
                Ok(Some(url)) => {
                    tracing::info!(%instance_id, %url, attempt = attempt + 1, "Deployment URL assigned");
                    return Ok(url);
                }
                Ok(None) => {
                    tracing::debug!(%instance_id, attempt = attempt + 1, "No deployment URL yet");
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(%instance_id, attempt = attempt + 1, error = %e, "Transient network status failure");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DeploymentError::DeploymentTimeout {
            instance_id: instance_id.to_string(),
            attempts: policy.max_attempts,
        })
    }

    async fn load_compose_file(&self) -> Result<String, DeploymentError> {
        let Some(path) = &self.config.compose_file else {
            return Ok(String::new());
        };
        tokio::fs::read_to_string(path).await.map_err(|e| {
            ConfigError::InvalidValue {
                key: "LAUNCHPAD_COMPOSE_FILE".to_string(),
                message: format!("cannot read {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Tear down tracked local resources and reset to `Stopped`.
    ///
    /// Idempotent. Teardown failures are logged, never returned. Cloud
    /// instances are left to the control plane.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        let mut state = self.state.write().await;

        if state.record.status == DeploymentStatus::Stopped
            && !state.local.simulator
            && !state.local.workload
        {
            return;
        }

        if let DeploymentBackend::Local(runtime) = &self.backend {
            if state.local.workload
                && let Err(e) = runtime.stop_workload().await
            {
                tracing::warn!(error = %e, "Failed to stop local workload");
            }
            if state.local.simulator
                && let Err(e) = runtime.stop_simulator().await
            {
                tracing::warn!(error = %e, "Failed to stop simulator");
            }
        } else if let Some(instance_id) = &state.record.instance_id {
            tracing::info!(%instance_id, "Releasing cloud deployment record; instance stays with the control plane");
        }

        state.local = LocalResources::default();
        state.record = DeploymentRecord::stopped(self.backend.mode());
        tracing::info!("Deployment stopped");
    }

    /// Call the ready instance's `/api/initialize` and return its public key.
    pub async fn initialize_agent(
        &self,
        request: &InitializeRequest,
    ) -> Result<String, DeploymentError> {
        let record = self.record().await;
        let url = match (record.status, record.deployment_url) {
            (DeploymentStatus::Ready, Some(url)) => url,
            _ => return Err(DeploymentError::NotRunning),
        };
        InstanceClient::new(&url, self.control_plane.request_timeout)?
            .initialize(request)
            .await
    }
}
