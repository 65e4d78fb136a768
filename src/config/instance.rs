use std::time::Duration;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::config::helpers::{first_non_empty_env, optional_env, parse_env_or, validate_http_url};
use crate::error::ConfigError;

/// Settings for the service running inside the confidential instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub host: String,
    pub port: u16,
    /// HTTP endpoint of the root-of-trust (tappd) service.
    pub root_of_trust_endpoint: String,
    pub root_of_trust_timeout: Duration,
    /// Program plus args to launch the agent after key derivation.
    pub agent_command: Option<Vec<String>>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            root_of_trust_endpoint: "http://localhost:8090".to_string(),
            root_of_trust_timeout: DEFAULT_REQUEST_TIMEOUT,
            agent_command: None,
        }
    }
}

impl InstanceConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let root_of_trust_endpoint =
            match first_non_empty_env(&["DSTACK_SIMULATOR_ENDPOINT", "TAPPD_ENDPOINT"])? {
                Some(raw) => validate_http_url("DSTACK_SIMULATOR_ENDPOINT", &raw)?,
                None => defaults.root_of_trust_endpoint,
            };

        Ok(Self {
            host: optional_env("HOST")?.unwrap_or(defaults.host),
            port: parse_env_or("PORT", defaults.port)?,
            root_of_trust_endpoint,
            root_of_trust_timeout: Duration::from_millis(parse_env_or(
                "TAPPD_TIMEOUT_MS",
                defaults.root_of_trust_timeout.as_millis() as u64,
            )?),
            agent_command: optional_env("INSTANCE_AGENT_COMMAND")?
                .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|parts| !parts.is_empty()),
        })
    }
}

/// Bind settings for the launchpad API.
#[derive(Debug, Clone)]
pub struct LaunchpadServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed in addition to the server's own localhost
    /// origins.
    pub allowed_origins: Vec<String>,
}

impl Default for LaunchpadServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
        }
    }
}

impl LaunchpadServerConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let allowed_origins = match optional_env("LAUNCHPAD_ALLOWED_ORIGINS")? {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(|origin| validate_http_url("LAUNCHPAD_ALLOWED_ORIGINS", origin))
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.allowed_origins,
        };
        Ok(Self {
            host: optional_env("LAUNCHPAD_HOST")?.unwrap_or(defaults.host),
            port: parse_env_or("LAUNCHPAD_PORT", defaults.port)?,
            allowed_origins,
        })
    }
}
