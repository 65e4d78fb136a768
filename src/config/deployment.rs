use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{
    first_non_empty_env, optional_env, optional_secret, parse_bool, parse_env_or,
    validate_http_url,
};
use crate::error::ConfigError;
use crate::orchestrator::BackoffPolicy;
use crate::secrets::EnvVar;

/// Prefix for deploy-time secrets forwarded (encrypted) to cloud instances.
pub const DEPLOY_ENV_PREFIX: &str = "LAUNCHPAD_DEPLOY_ENV_";

/// Compute shape and workload settings for a deployment.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub app_name: String,
    pub compose_file: Option<PathBuf>,
    pub teepod_id: u32,
    pub image: String,
    pub vcpu: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
    /// Secrets encrypted against the attestation key before leaving the host.
    pub deploy_env: Vec<EnvVar>,
    pub local: LocalRuntimeConfig,
    pub health_timeout: Duration,
    pub deployment_backoff: BackoffPolicy,
    pub readiness_backoff: BackoffPolicy,
    pub chain: String,
    /// Leave a failed instance up for debugging instead of tearing it down.
    pub keep_failed_instance: bool,
}

/// Local simulator + compose workload settings.
#[derive(Debug, Clone)]
pub struct LocalRuntimeConfig {
    pub simulator_image: String,
    pub simulator_port: u16,
    /// Simulator endpoint as seen from inside the workload container.
    pub simulator_endpoint: String,
    /// Program plus leading args used to drive compose (e.g. `docker compose`).
    pub compose_command: Vec<String>,
    pub deployment_url: String,
}

impl Default for LocalRuntimeConfig {
    fn default() -> Self {
        Self {
            simulator_image: "phalanetwork/tappd-simulator:latest".to_string(),
            simulator_port: 8090,
            simulator_endpoint: "http://host.docker.internal:8090".to_string(),
            compose_command: vec!["docker".to_string(), "compose".to_string()],
            deployment_url: "http://localhost:4000".to_string(),
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            app_name: "agentlaunchpadstarterkit".to_string(),
            compose_file: None,
            teepod_id: 2,
            image: "dstack-dev-0.3.4".to_string(),
            vcpu: 1,
            memory_mb: 2048,
            disk_gb: 20,
            deploy_env: Vec::new(),
            local: LocalRuntimeConfig::default(),
            health_timeout: Duration::from_secs(5),
            deployment_backoff: BackoffPolicy::DEPLOYMENT_URL,
            readiness_backoff: BackoffPolicy::READINESS,
            chain: "base-sepolia".to_string(),
            keep_failed_instance: true,
        }
    }
}

impl DeploymentConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let local_defaults = LocalRuntimeConfig::default();
        let compose_command = optional_env("LAUNCHPAD_COMPOSE_COMMAND")?
            .map(|raw| {
                raw.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|parts| !parts.is_empty())
            .unwrap_or(local_defaults.compose_command);
        let simulator_endpoint = match optional_env("LAUNCHPAD_SIMULATOR_ENDPOINT")? {
            Some(raw) => validate_http_url("LAUNCHPAD_SIMULATOR_ENDPOINT", &raw)?,
            None => local_defaults.simulator_endpoint,
        };
        let deployment_url = match optional_env("LAUNCHPAD_LOCAL_URL")? {
            Some(raw) => validate_http_url("LAUNCHPAD_LOCAL_URL", &raw)?,
            None => local_defaults.deployment_url,
        };

        Ok(Self {
            app_name: optional_env("LAUNCHPAD_APP_NAME")?.unwrap_or(defaults.app_name),
            compose_file: optional_env("LAUNCHPAD_COMPOSE_FILE")?.map(PathBuf::from),
            teepod_id: parse_env_or("LAUNCHPAD_TEEPOD_ID", defaults.teepod_id)?,
            image: optional_env("LAUNCHPAD_IMAGE")?.unwrap_or(defaults.image),
            vcpu: parse_env_or("LAUNCHPAD_VCPU", defaults.vcpu)?,
            memory_mb: parse_env_or("LAUNCHPAD_MEMORY_MB", defaults.memory_mb)?,
            disk_gb: parse_env_or("LAUNCHPAD_DISK_GB", defaults.disk_gb)?,
            deploy_env: collect_deploy_env(std::env::vars()),
            local: LocalRuntimeConfig {
                simulator_image: optional_env("LAUNCHPAD_SIMULATOR_IMAGE")?
                    .unwrap_or(local_defaults.simulator_image),
                simulator_port: parse_env_or(
                    "LAUNCHPAD_SIMULATOR_PORT",
                    local_defaults.simulator_port,
                )?,
                simulator_endpoint,
                compose_command,
                deployment_url,
            },
            health_timeout: Duration::from_millis(parse_env_or(
                "LAUNCHPAD_HEALTH_TIMEOUT_MS",
                5_000u64,
            )?),
            deployment_backoff: defaults.deployment_backoff,
            readiness_backoff: defaults.readiness_backoff,
            chain: first_non_empty_env(&["LAUNCHPAD_CHAIN", "NEXT_PUBLIC_PREFERRED_CHAIN"])?
                .unwrap_or(defaults.chain),
            keep_failed_instance: parse_bool(
                "LAUNCHPAD_KEEP_FAILED_INSTANCE",
                defaults.keep_failed_instance,
            )?,
        })
    }
}

/// Collect `LAUNCHPAD_DEPLOY_ENV_<NAME>=value` pairs as `<NAME>=value`,
/// ordered by name.
pub(crate) fn collect_deploy_env(vars: impl Iterator<Item = (String, String)>) -> Vec<EnvVar> {
    vars.filter_map(|(key, value)| {
        let name = key.strip_prefix(DEPLOY_ENV_PREFIX)?;
        (!name.is_empty()).then(|| (name.to_string(), value))
    })
    .collect::<BTreeMap<_, _>>()
    .into_iter()
    .map(|(key, value)| EnvVar::new(key, value))
    .collect()
}

/// Third-party credentials forwarded to the instance's `/api/initialize`.
#[derive(Debug, Clone, Default)]
pub struct AgentCredentials {
    pub alchemy_api_key: Option<SecretString>,
    pub coingecko_api_key: Option<SecretString>,
    pub openai_api_key: Option<SecretString>,
    pub solana_rpc_url: Option<String>,
}

impl AgentCredentials {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            alchemy_api_key: optional_secret("ALCHEMY_API_KEY")?,
            coingecko_api_key: optional_secret("COINGECKO_API_KEY")?,
            openai_api_key: optional_secret("OPENAI_API_KEY")?,
            solana_rpc_url: optional_env("SOLANA_RPC_URL")?,
        })
    }
}
