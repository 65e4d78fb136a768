use std::time::Duration;

use secrecy::SecretString;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::config::helpers::{optional_env, optional_secret, parse_env_or, validate_http_url};
use crate::error::ConfigError;

pub const DEFAULT_CLOUD_API_URL: &str = "https://cloud-api.phala.network";
pub const DEFAULT_CLOUD_DASHBOARD_URL: &str = "https://cloud.phala.network";

/// Confidential-compute control plane settings.
///
/// The API key doubles as the mode switch: without one, deployments run
/// against the local simulator.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub api_key: Option<SecretString>,
    pub api_url: String,
    pub dashboard_url: String,
    pub request_timeout: Duration,
}

impl ControlPlaneConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let api_url = match optional_env("PHALA_CLOUD_API_URL")? {
            Some(raw) => validate_http_url("PHALA_CLOUD_API_URL", &raw)?,
            None => DEFAULT_CLOUD_API_URL.to_string(),
        };
        let dashboard_url = match optional_env("PHALA_CLOUD_DASHBOARD_URL")? {
            Some(raw) => validate_http_url("PHALA_CLOUD_DASHBOARD_URL", &raw)?,
            None => DEFAULT_CLOUD_DASHBOARD_URL.to_string(),
        };

        Ok(Self {
            api_key: optional_secret("PHALA_CLOUD_API_KEY")?,
            api_url,
            dashboard_url,
            request_timeout: Duration::from_millis(parse_env_or(
                "PHALA_CLOUD_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            )?),
        })
    }

    pub fn cloud_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Dashboard page for a deployed instance.
    pub fn dashboard_link(&self, app_id: &str) -> String {
        format!("{}/dashboard/cvms/app_{app_id}", self.dashboard_url)
    }
}
