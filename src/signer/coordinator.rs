use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};

use crate::config::CustodianConfig;
use crate::error::{ConfigError, SignerError};
use crate::redact::redact_sensitive_detail;
use crate::signer::types::{
    ApprovalBody, ApprovalEntry, ApprovalSignature, CreateSignerBody, DelegatedSignerOutcome,
    RemoteSignerStatus, SignerLocator, SignerLookup, SignerRecord,
};

/// Drives delegated-signer registration and approval against the wallet
/// custodian.
pub struct DelegatedSignerCoordinator {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl DelegatedSignerCoordinator {
    pub fn new(config: &CustodianConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CROSSMINT_TIMEOUT_MS".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn wallet_url(&self, wallet_address: &str, rest: &str) -> String {
        format!("{}/wallets/{wallet_address}{rest}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("X-API-KEY", self.api_key.expose_secret())
            .header(CONTENT_TYPE, "application/json")
    }

    /// Return the pending approval for `signer_address`, registering it first
    /// if the custodian has no usable record.
    ///
    /// Re-entry with a signer that is awaiting approval returns the existing
    /// request; an active signer short-circuits with `already_active`. At
    /// most one creation request is issued per call.
    pub async fn ensure_delegated_signer(
        &self,
        wallet_address: &str,
        signer_address: &str,
        chain: &str,
        signer_type: &str,
    ) -> Result<DelegatedSignerOutcome, SignerError> {
        let locator = SignerLocator::new(signer_type, signer_address);
        let chain = locator.is_evm().then_some(chain);

        match self.lookup(wallet_address, &locator, chain).await? {
            SignerLookup::Found(record) => match &record.status {
                RemoteSignerStatus::AwaitingApproval => {
                    tracing::info!(%locator, request_id = %record.request_id, "Delegated signer awaiting approval");
                    return Ok(DelegatedSignerOutcome::from_record(record, &locator));
                }
                RemoteSignerStatus::Active => {
                    tracing::info!(%locator, "Delegated signer already active");
                    return Ok(DelegatedSignerOutcome::from_record(record, &locator));
                }
                RemoteSignerStatus::Other(status) => {
                    tracing::info!(%locator, %status, "Existing delegated signer is not usable; registering again");
                }
            },
            SignerLookup::Absent => {
                tracing::info!(%locator, "No delegated signer found; registering");
            }
        }

        let record = self.create(wallet_address, &locator, chain).await?;
        Ok(DelegatedSignerOutcome::from_record(record, &locator))
    }

    /// Look up a signer. Client errors and unparseable bodies are `Absent`;
    /// server and transport errors are surfaced so a flaky custodian cannot
    /// trigger duplicate registrations. `chain` selects the approval target
    /// of EVM signers and is `None` for Solana ones.
    pub async fn lookup(
        &self,
        wallet_address: &str,
        locator: &SignerLocator,
        chain: Option<&str>,
    ) -> Result<SignerLookup, SignerError> {
        let lookup_error = |reason: String| SignerError::Lookup {
            locator: locator.to_string(),
            reason,
        };

        let response = self
            .authorized(
                self.http
                    .get(self.wallet_url(wallet_address, &format!("/signers/{locator}"))),
            )
            .send()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(lookup_error(format!(
                "HTTP {}: {}",
                status.as_u16(),
                redact_sensitive_detail(&body)
            )));
        }
        if !status.is_success() {
            tracing::debug!(%locator, status = status.as_u16(), "Signer lookup returned no record");
            return Ok(SignerLookup::Absent);
        }

        let body = response
            .text()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;
        match SignerRecord::parse(&body, chain) {
            Ok(record) => Ok(SignerLookup::Found(record)),
            Err(e) => {
                tracing::warn!(%locator, error = %e, "Unrecognized signer lookup payload; treating as absent");
                Ok(SignerLookup::Absent)
            }
        }
    }

    async fn create(
        &self,
        wallet_address: &str,
        locator: &SignerLocator,
        chain: Option<&str>,
    ) -> Result<SignerRecord, SignerError> {
        let creation_error = |reason: String| SignerError::Creation {
            locator: locator.to_string(),
            reason,
        };

        let body = CreateSignerBody {
            signer: locator.to_string(),
            chain,
        };
        let response = self
            .authorized(self.http.post(self.wallet_url(wallet_address, "/signers")))
            .json(&body)
            .send()
            .await
            .map_err(|e| creation_error(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| creation_error(e.to_string()))?;
        if !status.is_success() {
            return Err(creation_error(format!(
                "HTTP {}: {}",
                status.as_u16(),
                redact_sensitive_detail(&text)
            )));
        }

        let record = SignerRecord::parse(&text, chain)
            .map_err(|e| creation_error(e.to_string()))?;
        tracing::info!(%locator, request_id = %record.request_id, "Delegated signer registered");
        Ok(record)
    }

    /// Submit the wallet owner's signature for a pending signer request.
    /// Never retried: a consumed challenge must not be replayed.
    pub async fn submit_approval(
        &self,
        signature: &ApprovalSignature,
        signer_locator: &str,
        wallet_address: &str,
        request_id: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), SignerError> {
        self.post_approval(
            &format!("/signatures/{request_id}/approvals"),
            wallet_address,
            request_id,
            ApprovalEntry {
                signer: signer_locator,
                metadata,
                signature,
            },
        )
        .await
    }

    /// Submit an approval for a pending wallet transaction.
    pub async fn submit_transaction_approval(
        &self,
        signature: &ApprovalSignature,
        signer_locator: &str,
        wallet_address: &str,
        transaction_id: &str,
    ) -> Result<(), SignerError> {
        self.post_approval(
            &format!("/transactions/{transaction_id}/approvals"),
            wallet_address,
            transaction_id,
            ApprovalEntry {
                signer: signer_locator,
                metadata: None,
                signature,
            },
        )
        .await
    }

    async fn post_approval(
        &self,
        path: &str,
        wallet_address: &str,
        target_id: &str,
        entry: ApprovalEntry<'_>,
    ) -> Result<(), SignerError> {
        let submission_error = |reason: String| SignerError::ApprovalSubmission {
            target_id: target_id.to_string(),
            reason,
        };

        let response = self
            .authorized(self.http.post(self.wallet_url(wallet_address, path)))
            .json(&ApprovalBody { approvals: [entry] })
            .send()
            .await
            .map_err(|e| submission_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(submission_error(format!(
                "HTTP {}: {}",
                status.as_u16(),
                redact_sensitive_detail(&body)
            )));
        }

        tracing::info!(target_id, "Approval submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const WALLET: &str = "0x1111111111111111111111111111111111111111";
    const AGENT: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

    fn coordinator(server: &MockServer) -> DelegatedSignerCoordinator {
        let config = CustodianConfig::new(SecretString::from("sk_staging_test"))
            .with_base_url(server.uri());
        DelegatedSignerCoordinator::new(&config).unwrap()
    }

    fn signer_path() -> String {
        format!("/wallets/{WALLET}/signers/evm-passkey:{AGENT}")
    }

    fn pending_evm(id: &str) -> serde_json::Value {
        json!({
            "chains": {
                "base-sepolia": {
                    "id": id,
                    "status": "awaiting-approval",
                    "approvals": {"pending": [{"message": "0xchallenge", "signer": "evm-passkey:0xowner"}]}
                }
            }
        })
    }

    #[tokio::test]
    async fn awaiting_approval_is_returned_without_creation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(signer_path()))
            .and(header("X-API-KEY", "sk_staging_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pending_evm("sig-1")))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/wallets/{WALLET}/signers")))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let coordinator = coordinator(&server);
        let first = coordinator
            .ensure_delegated_signer(WALLET, AGENT, "base-sepolia", "evm-passkey")
            .await
            .unwrap();
        let second = coordinator
            .ensure_delegated_signer(WALLET, AGENT, "base-sepolia", "evm-passkey")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.request_id, "sig-1");
        assert_eq!(first.pending_message, "0xchallenge");
        assert_eq!(first.target_signer_locator, "evm-passkey:0xowner");
        assert!(!first.already_active);
    }

    #[tokio::test]
    async fn active_signer_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(signer_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chains": {"base-sepolia": {"id": "sig-1", "status": "success"}}
            })))
            .mount(&server)
            .await;

        let outcome = coordinator(&server)
            .ensure_delegated_signer(WALLET, AGENT, "base-sepolia", "evm-passkey")
            .await
            .unwrap();
        assert!(outcome.already_active);
        assert_eq!(outcome.pending_message, "");
        assert_eq!(outcome.request_id, "");
    }

    #[tokio::test]
    async fn multi_chain_lookup_uses_configured_chain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(signer_path()))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"chains":{
                    "base-sepolia":{"id":"sig-base","status":"active"},
                    "arbitrum":{"id":"sig-arb","status":"awaiting-approval",
                        "approvals":{"pending":[{"message":"0xarb","signer":"evm-passkey:0xowner"}]}}
                }}"#,
                "application/json",
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let coordinator = coordinator(&server);
        let arbitrum = coordinator
            .ensure_delegated_signer(WALLET, AGENT, "arbitrum", "evm-passkey")
            .await
            .unwrap();
        assert!(!arbitrum.already_active);
        assert_eq!(arbitrum.request_id, "sig-arb");
        assert_eq!(arbitrum.pending_message, "0xarb");

        let base = coordinator
            .ensure_delegated_signer(WALLET, AGENT, "base-sepolia", "evm-passkey")
            .await
            .unwrap();
        assert!(base.already_active);
    }

    #[tokio::test]
    async fn missing_signer_is_created_with_chain_for_evm() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(signer_path()))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/wallets/{WALLET}/signers")))
            .and(body_json(json!({
                "signer": format!("evm-passkey:{AGENT}"),
                "chain": "base-sepolia"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(pending_evm("sig-2")))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = coordinator(&server)
            .ensure_delegated_signer(WALLET, AGENT, "base-sepolia", "evm-passkey")
            .await
            .unwrap();
        assert_eq!(outcome.request_id, "sig-2");
        assert_eq!(outcome.pending_message, "0xchallenge");
    }

    #[tokio::test]
    async fn unparseable_lookup_falls_back_to_creation_without_chain_for_solana() {
        let server = MockServer::start().await;
        let wallet = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
        let agent = "FVen3X669xLzsi6N2V91DoiyzHzg1uAgqiT8jZ9nS96Z";
        Mock::given(method("GET"))
            .and(path(format!("/wallets/{wallet}/signers/solana-keypair:{agent}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/wallets/{wallet}/signers")))
            .and(body_json(json!({"signer": format!("solana-keypair:{agent}")})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transaction": {
                    "id": "tx-9",
                    "status": "awaiting-approval",
                    "approvals": {"pending": [{"message": "3yZe7d", "signer": "solana-keypair:owner"}]}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = coordinator(&server)
            .ensure_delegated_signer(wallet, agent, "solana", "solana-keypair")
            .await
            .unwrap();
        assert_eq!(outcome.request_id, "tx-9");
        assert_eq!(outcome.pending_message, "3yZe7d");
    }

    #[tokio::test]
    async fn server_errors_on_lookup_do_not_create() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(signer_path()))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = coordinator(&server)
            .ensure_delegated_signer(WALLET, AGENT, "base-sepolia", "evm-passkey")
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::Lookup { .. }));
    }

    #[tokio::test]
    async fn malformed_creation_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .expect(1)
            .mount(&server)
            .await;

        let err = coordinator(&server)
            .ensure_delegated_signer(WALLET, AGENT, "base-sepolia", "evm-passkey")
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::Creation { .. }));
    }

    #[tokio::test]
    async fn approval_posts_signature_and_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/wallets/{WALLET}/signatures/sig-1/approvals")))
            .and(body_json(json!({"approvals": [{
                "signer": "evm-passkey:0xowner",
                "metadata": {"typeIndex": 1},
                "signature": {"r": "0x01", "s": "0x02"}
            }]})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let signature = ApprovalSignature::Evm {
            r: "0x01".to_string(),
            s: "0x02".to_string(),
        };
        coordinator(&server)
            .submit_approval(
                &signature,
                "evm-passkey:0xowner",
                WALLET,
                "sig-1",
                Some(&json!({"typeIndex": 1})),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejected_approval_is_fatal_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/wallets/{WALLET}/transactions/tx-1/approvals")))
            .respond_with(ResponseTemplate::new(500).set_body_string("stale challenge"))
            .expect(1)
            .mount(&server)
            .await;

        let err = coordinator(&server)
            .submit_transaction_approval(
                &ApprovalSignature::Encoded("5Kd3".to_string()),
                "solana-keypair:owner",
                WALLET,
                "tx-1",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SignerError::ApprovalSubmission { ref target_id, .. } if target_id == "tx-1"
        ));
    }
}
