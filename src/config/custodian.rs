use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::config::helpers::{optional_env, parse_env_or, required_secret, validate_http_url};
use crate::error::ConfigError;

const API_VERSION_PATH: &str = "api/2022-06-09";

/// Deployment environment encoded in a custodian API key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustodianEnvironment {
    Development,
    Staging,
    Production,
}

impl CustodianEnvironment {
    /// Keys look like `sk_staging_...` / `ck_production_...`; anything else is
    /// treated as a local development key.
    pub fn from_api_key(api_key: &str) -> Self {
        let mut parts = api_key.trim().splitn(3, '_');
        let _scope = parts.next();
        match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("production") => Self::Production,
            Some("staging") => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn base_url(self) -> String {
        match self {
            Self::Production => format!("https://www.crossmint.com/{API_VERSION_PATH}"),
            Self::Staging => format!("https://staging.crossmint.com/{API_VERSION_PATH}"),
            Self::Development => format!("http://localhost:3000/{API_VERSION_PATH}"),
        }
    }
}

/// Wallet-custodian API settings.
#[derive(Debug, Clone)]
pub struct CustodianConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl CustodianConfig {
    pub fn new(api_key: SecretString) -> Self {
        let base_url = CustodianEnvironment::from_api_key(api_key.expose_secret()).base_url();
        Self {
            api_key,
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = crate::config::helpers::normalize_base_url(&base_url.into());
        self
    }

    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let api_key = required_secret(
            "CROSSMINT_SERVER_API_KEY",
            "Set a server-side custodian API key to register delegated signers.",
        )?;
        let mut config = Self::new(api_key);
        if let Some(raw) = optional_env("CROSSMINT_BASE_URL")? {
            config.base_url = validate_http_url("CROSSMINT_BASE_URL", &raw)?;
        }
        config.request_timeout =
            Duration::from_millis(parse_env_or(
                "CROSSMINT_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            )?);
        Ok(config)
    }
}
