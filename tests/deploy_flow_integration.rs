//! End-to-end deploy flow: a local deployment backed by a real instance
//! server, with the wallet custodian mocked.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agent_launchpad::config::{
    AgentCredentials, ControlPlaneConfig, CustodianConfig, DeploymentConfig,
};
use agent_launchpad::error::{DeploymentError, InstanceError};
use agent_launchpad::instance::{
    InstanceServer, InstanceSession, KeyDerivationService, RootKeyProvider,
};
use agent_launchpad::launchpad::types::ApproveSignatureRequest;
use agent_launchpad::launchpad::{Custodian, LaunchpadOptions, LaunchpadService};
use agent_launchpad::orchestrator::{
    BackoffPolicy, DeploymentBackend, DeploymentOrchestrator, DeploymentStatus, LocalRuntime,
};
use agent_launchpad::signer::{ApprovalSignature, DelegatedSignerCoordinator};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVM_WALLET: &str = "0x1111111111111111111111111111111111111111";
const SOLANA_WALLET: &str = "7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV";

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    let text = err.to_string();
    text.contains("Operation not permitted") || text.to_lowercase().contains("failed to bind")
}

/// Root of trust returning fixed material, like the tappd simulator.
struct FixedRootKey;

#[async_trait]
impl RootKeyProvider for FixedRootKey {
    async fn derive_key(&self, path: &str, _subject: &str) -> Result<Vec<u8>, InstanceError> {
        let mut raw = vec![0x42u8; 48];
        for (slot, byte) in raw.iter_mut().zip(path.bytes()) {
            *slot ^= byte;
        }
        Ok(raw)
    }
}

fn derivation() -> KeyDerivationService {
    KeyDerivationService::new(Arc::new(FixedRootKey))
}

/// Local runtime whose "workload" is an in-process instance server.
struct InProcessRuntime {
    url: String,
    simulator_starts: AtomicUsize,
    workload_starts: AtomicUsize,
    stops: AtomicUsize,
}

#[async_trait]
impl LocalRuntime for InProcessRuntime {
    async fn start_simulator(&self) -> Result<(), DeploymentError> {
        self.simulator_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_simulator(&self) -> Result<(), DeploymentError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_workload(&self) -> Result<(), DeploymentError> {
        self.workload_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_workload(&self) -> Result<(), DeploymentError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deployment_url(&self) -> String {
        self.url.clone()
    }
}

async fn start_instance() -> Option<InstanceServer> {
    let session = Arc::new(InstanceSession::new(derivation(), None));
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    match agent_launchpad::instance::start_server(addr, session).await {
        Ok(server) => Some(server),
        Err(e) if is_bind_permission_error(&e) => None,
        Err(e) => panic!("Failed to start instance server: {e:?}"),
    }
}

fn launchpad(
    runtime: Arc<InProcessRuntime>,
    custodian_url: &str,
    keep_failed_instance: bool,
) -> LaunchpadService {
    let deployment = DeploymentConfig {
        readiness_backoff: BackoffPolicy {
            initial_delay: Duration::from_millis(5),
            factor: 1.0,
            max_delay: Duration::from_millis(5),
            max_attempts: 20,
        },
        health_timeout: Duration::from_secs(2),
        ..DeploymentConfig::default()
    };
    let control_plane = ControlPlaneConfig {
        api_key: None,
        api_url: "http://127.0.0.1:1".to_string(),
        dashboard_url: "http://127.0.0.1:1".to_string(),
        request_timeout: Duration::from_secs(1),
    };
    let orchestrator =
        DeploymentOrchestrator::new(DeploymentBackend::Local(runtime), deployment, control_plane);

    let custodian_config =
        CustodianConfig::new(SecretString::from("sk_staging_integration")).with_base_url(custodian_url);
    let custodian = Custodian {
        api_key: custodian_config.api_key.clone(),
        signer: DelegatedSignerCoordinator::new(&custodian_config).unwrap(),
    };

    LaunchpadService::new(
        Arc::new(orchestrator),
        Some(custodian),
        None,
        LaunchpadOptions {
            credentials: AgentCredentials::default(),
            chain: "base-sepolia".to_string(),
            keep_failed_instance,
        },
    )
}

fn runtime_for(server: &InstanceServer) -> Arc<InProcessRuntime> {
    Arc::new(InProcessRuntime {
        url: format!("http://{}", server.addr),
        simulator_starts: AtomicUsize::new(0),
        workload_starts: AtomicUsize::new(0),
        stops: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn evm_wallet_deploy_approve_and_redeploy() {
    let Some(server) = start_instance().await else {
        return;
    };
    let runtime = runtime_for(&server);
    let custodian = MockServer::start().await;

    let agent_signer = derivation()
        .derive(EVM_WALLET)
        .await
        .unwrap()
        .public_address()
        .to_string();
    let locator = format!("evm-passkey:{agent_signer}");
    let lookup_path = format!("/wallets/{EVM_WALLET}/signers/{locator}");

    Mock::given(method("GET"))
        .and(path(lookup_path.as_str()))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .expect(1)
        .mount(&custodian)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/wallets/{EVM_WALLET}/signers")))
        .and(header("X-API-KEY", "sk_staging_integration"))
        .and(body_partial_json(json!({"signer": locator, "chain": "base-sepolia"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "chains": {
                "base-sepolia": {
                    "id": "sig-1",
                    "status": "awaiting-approval",
                    "approvals": {
                        "pending": [{"message": "0xfeedface", "signer": "evm-passkey:0xowner"}]
                    }
                }
            }
        })))
        .expect(1)
        .mount(&custodian)
        .await;

    let service = launchpad(runtime.clone(), &custodian.uri(), true);

    let first = service.deploy(EVM_WALLET, "evm-passkey").await.unwrap();
    assert!(first.success);
    assert_eq!(first.delegated_signer_message, "0xfeedface");
    assert_eq!(first.delegated_signer_id, "sig-1");
    assert_eq!(first.target_signer_locator, "evm-passkey:0xowner");
    assert!(!first.delegated_signer_already_active);
    assert_eq!(service.status().await.status, DeploymentStatus::Ready);

    Mock::given(method("POST"))
        .and(path(format!("/wallets/{EVM_WALLET}/signatures/sig-1/approvals")))
        .and(body_partial_json(json!({
            "approvals": [{"signer": "evm-passkey:0xowner", "signature": {"r": "0x01", "s": "0x02"}}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&custodian)
        .await;
    service
        .approve_signature(&ApproveSignatureRequest {
            signature: ApprovalSignature::Evm {
                r: "0x01".to_string(),
                s: "0x02".to_string(),
            },
            signer_locator: "evm-passkey:0xowner".to_string(),
            wallet_address: EVM_WALLET.to_string(),
            signature_id: "sig-1".to_string(),
            metadata: None,
        })
        .await
        .unwrap();
    custodian.verify().await;

    custodian.reset().await;
    Mock::given(method("GET"))
        .and(path(lookup_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chains": {"base-sepolia": {"id": "sig-1", "status": "active"}}
        })))
        .expect(1)
        .mount(&custodian)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/wallets/{EVM_WALLET}/signers")))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&custodian)
        .await;

    let second = service.deploy(EVM_WALLET, "evm-passkey").await.unwrap();
    assert!(second.delegated_signer_already_active);
    assert!(second.delegated_signer_message.is_empty());
    assert_eq!(second.target_signer_locator, locator);

    // The running deployment is reused.
    assert_eq!(runtime.simulator_starts.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.workload_starts.load(Ordering::SeqCst), 1);

    service.stop().await;
    service.stop().await;
    assert_eq!(service.status().await.status, DeploymentStatus::Stopped);
    assert_eq!(runtime.stops.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn solana_wallet_registers_without_chain() {
    let Some(server) = start_instance().await else {
        return;
    };
    let runtime = runtime_for(&server);
    let custodian = MockServer::start().await;

    let agent_signer = derivation()
        .derive(SOLANA_WALLET)
        .await
        .unwrap()
        .public_address()
        .to_string();
    let locator = format!("solana-keypair:{agent_signer}");

    Mock::given(method("GET"))
        .and(path(format!("/wallets/{SOLANA_WALLET}/signers/{locator}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&custodian)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/wallets/{SOLANA_WALLET}/signers")))
        .and(body_partial_json(json!({"signer": locator})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "transaction": {
                "id": "tx-9",
                "status": "awaiting-approval",
                "approvals": {"pending": [{"message": "3yZe7d", "signer": "solana-keypair:owner"}]}
            }
        })))
        .expect(1)
        .mount(&custodian)
        .await;

    let service = launchpad(runtime, &custodian.uri(), true);
    let response = service.deploy(SOLANA_WALLET, "solana-keypair").await.unwrap();

    assert_eq!(response.delegated_signer_id, "tx-9");
    assert_eq!(response.delegated_signer_message, "3yZe7d");

    let requests = custodian.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
    assert!(body.get("chain").is_none());
}

#[tokio::test]
async fn custodian_outage_fails_deploy_and_tears_down() {
    let Some(server) = start_instance().await else {
        return;
    };
    let runtime = runtime_for(&server);
    let custodian = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&custodian)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&custodian)
        .await;

    let service = launchpad(runtime.clone(), &custodian.uri(), false);
    let err = service.deploy(EVM_WALLET, "evm-passkey").await.unwrap_err();

    assert!(err.to_string().contains("lookup"), "unexpected error: {err}");
    assert_eq!(service.status().await.status, DeploymentStatus::Stopped);
    assert_eq!(runtime.stops.load(Ordering::SeqCst), 2);
}
