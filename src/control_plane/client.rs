use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::config::ControlPlaneConfig;
use crate::control_plane::types::{
    AttestationPubkey, AuthMeResponse, ControlPlaneUser, CreateInstanceRequest,
    CreateInstanceResponse, InstanceNetwork, InstanceSummary, UserSearchResponse,
    VmConfiguration,
};
use crate::error::{ConfigError, ControlPlaneError};
use crate::redact::redact_sensitive_detail;
use crate::secrets::EncryptedSecretBundle;

const API_PREFIX: &str = "/api/v1";
const USER_AGENT: &str = concat!("agent-launchpad/", env!("CARGO_PKG_VERSION"));

/// Typed client for the confidential-compute control plane.
///
/// Every call is single-shot; retry policy belongs to the caller.
#[derive(Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    api_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for ControlPlaneClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl ControlPlaneClient {
    pub fn new(config: &ControlPlaneConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "PHALA_CLOUD_API_KEY".to_string(),
                hint: "Set a control-plane API key to deploy to the cloud.".to_string(),
            })?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "PHALA_CLOUD_TIMEOUT_MS".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.api_url)
    }

    /// Request the attestation-bound encryption key for `config`.
    pub async fn fetch_attestation_pubkey(
        &self,
        config: &VmConfiguration,
    ) -> Result<AttestationPubkey, ControlPlaneError> {
        let request = self
            .http
            .post(self.endpoint("/cvms/pubkey/from_cvm_configuration"))
            .json(config);
        let pubkey: AttestationPubkey = self.send_json("fetch_attestation_pubkey", request).await?;
        if pubkey.encryption_public_key.trim().is_empty() {
            return Err(ControlPlaneError::InvalidResponse {
                operation: "fetch_attestation_pubkey",
                reason: "empty app_env_encrypt_pubkey".to_string(),
            });
        }
        Ok(pubkey)
    }

    /// Submit the final configuration with sealed secrets. Returns the
    /// instance (app) id.
    pub async fn create_instance(
        &self,
        config: &VmConfiguration,
        bundle: &EncryptedSecretBundle,
        attestation: &AttestationPubkey,
    ) -> Result<String, ControlPlaneError> {
        let body = CreateInstanceRequest {
            config,
            encrypted_env: bundle.as_hex(),
            app_env_encrypt_pubkey: &attestation.encryption_public_key,
            app_id_salt: &attestation.app_id_salt,
        };
        let request = self
            .http
            .post(self.endpoint("/cvms/from_cvm_configuration"))
            .json(&body);
        let created: CreateInstanceResponse = self.send_json("create_instance", request).await?;
        let app_id = created.app_id.trim();
        if app_id.is_empty() {
            return Err(ControlPlaneError::InvalidResponse {
                operation: "create_instance",
                reason: "empty app_id".to_string(),
            });
        }
        Ok(app_id.to_string())
    }

    /// Single-shot network query. `Ok(None)` until a public URL is assigned.
    pub async fn poll_network_status(
        &self,
        instance_id: &str,
    ) -> Result<Option<String>, ControlPlaneError> {
        let request = self
            .http
            .get(self.endpoint(&format!("/cvms/app_{instance_id}/network")));
        let network: InstanceNetwork = self.send_json("poll_network_status", request).await?;
        Ok(network.app_url().map(str::to_string))
    }

    /// Resolve the account that owns the API key.
    pub async fn current_user(&self) -> Result<ControlPlaneUser, ControlPlaneError> {
        let me: AuthMeResponse = self
            .send_json("current_user", self.http.get(self.endpoint("/auth/me")))
            .await?;

        let search_url = self.endpoint(&format!(
            "/users/search?q={}",
            urlencoding::encode(&me.username)
        ));
        let found: UserSearchResponse = self
            .send_json("current_user", self.http.get(search_url))
            .await?;
        let id = found
            .users
            .first()
            .and_then(|user| user.id_string())
            .ok_or_else(|| ControlPlaneError::InvalidResponse {
                operation: "current_user",
                reason: format!("no user id found for {}", me.username),
            })?;

        Ok(ControlPlaneUser {
            id,
            username: me.username,
        })
    }

    pub async fn list_instances(
        &self,
        user_id: &str,
    ) -> Result<Vec<InstanceSummary>, ControlPlaneError> {
        let url = self.endpoint(&format!("/cvms?user_id={}", urlencoding::encode(user_id)));
        self.send_json("list_instances", self.http.get(url)).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ControlPlaneError> {
        let response = request
            .header("X-API-Key", self.api_key.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(operation, e))?;

        if !status.is_success() {
            tracing::debug!(operation, status = status.as_u16(), "Control plane rejected request");
            return Err(ControlPlaneError::Status {
                operation,
                status: status.as_u16(),
                body: redact_sensitive_detail(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ControlPlaneError::InvalidResponse {
            operation,
            reason: e.to_string(),
        })
    }
}

fn transport_error(operation: &'static str, error: reqwest::Error) -> ControlPlaneError {
    ControlPlaneError::Transport {
        operation,
        reason: redact_sensitive_detail(&error.to_string()),
        transient: !error.is_builder(),
    }
}
