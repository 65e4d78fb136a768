use std::time::Duration;

use crate::error::DeploymentError;
use crate::instance::protocol::{ErrorResponse, InitializeRequest, InitializeResponse};
use crate::redact::redact_sensitive_detail;

/// Orchestrator-side client for a deployed instance's API.
pub struct InstanceClient {
    http: reqwest::Client,
    base_url: String,
}

impl InstanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeploymentError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeploymentError::Initialization {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Trigger key derivation and return the signer's public address.
    pub async fn initialize(&self, request: &InitializeRequest) -> Result<String, DeploymentError> {
        let mut builder = self.http.post(format!("{}/api/initialize", self.base_url));
        for (name, value) in request.header_pairs() {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DeploymentError::Initialization {
                reason: e.to_string(),
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeploymentError::Initialization {
                reason: e.to_string(),
            })?;

        if !status.is_success() {
            let reason = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error)
                .unwrap_or_else(|_| redact_sensitive_detail(&body));
            return Err(DeploymentError::Initialization {
                reason: format!("HTTP {}: {reason}", status.as_u16()),
            });
        }

        let parsed: InitializeResponse =
            serde_json::from_str(&body).map_err(|e| DeploymentError::Initialization {
                reason: format!("unexpected response: {e}"),
            })?;
        if parsed.public_key.trim().is_empty() {
            return Err(DeploymentError::Initialization {
                reason: "instance returned an empty public key".to_string(),
            });
        }
        tracing::info!(signer = %parsed.public_key, "Instance initialized");
        Ok(parsed.public_key)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn initialize_sends_headers_and_returns_public_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/initialize"))
            .and(header("x-wallet-address", "0xabc"))
            .and(header("x-api-key", "sk_staging_1"))
            .and(header("x-chain", "base-sepolia"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success", "publicKey": "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = InstanceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let request = InitializeRequest::new("0xabc", SecretString::from("sk_staging_1"))
            .with_chain("base-sepolia");
        assert_eq!(
            client.initialize(&request).await.unwrap(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
    }

    #[tokio::test]
    async fn instance_errors_are_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"error": "Failed to generate public key"})),
            )
            .mount(&server)
            .await;

        let client = InstanceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client
            .initialize(&InitializeRequest::new("0xabc", SecretString::from("k")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to generate public key"));
    }
}
