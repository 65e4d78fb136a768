//! Configuration for the launchpad.
//!
//! Everything is resolved from env vars (after `bootstrap::load_launchpad_env`
//! has loaded `./.env` and `~/.agent-launchpad/.env`), falling back to
//! defaults. Secrets are wrapped in `SecretString` as soon as they are read.

mod control_plane;
mod custodian;
mod deployment;
pub(crate) mod helpers;
mod instance;

use std::time::Duration;

use crate::error::ConfigError;

/// Per-request timeout for every outbound HTTP call unless overridden. Retry
/// loops budget their own delays on top of this slice.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub use self::control_plane::{
    ControlPlaneConfig, DEFAULT_CLOUD_API_URL, DEFAULT_CLOUD_DASHBOARD_URL,
};
pub use self::custodian::{CustodianConfig, CustodianEnvironment};
pub use self::deployment::{
    AgentCredentials, DEPLOY_ENV_PREFIX, DeploymentConfig, LocalRuntimeConfig,
};
pub use self::instance::{InstanceConfig, LaunchpadServerConfig};

/// Orchestrator-side configuration (launchpad API and CLI).
#[derive(Debug, Clone)]
pub struct Config {
    pub control_plane: ControlPlaneConfig,
    pub custodian: Option<CustodianConfig>,
    pub deployment: DeploymentConfig,
    pub credentials: AgentCredentials,
    pub server: LaunchpadServerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let custodian = match CustodianConfig::resolve() {
            Ok(config) => Some(config),
            Err(ConfigError::MissingRequired { .. }) => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            control_plane: ControlPlaneConfig::resolve()?,
            custodian,
            deployment: DeploymentConfig::resolve()?,
            credentials: AgentCredentials::resolve()?,
            server: LaunchpadServerConfig::resolve()?,
        })
    }

    /// Custodian settings, required for any delegated-signer operation.
    pub fn require_custodian(&self) -> Result<&CustodianConfig, ConfigError> {
        self.custodian
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CROSSMINT_SERVER_API_KEY".to_string(),
                hint: "Set a server-side custodian API key to register delegated signers."
                    .to_string(),
            })
    }
}

impl InstanceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve()
    }
}
