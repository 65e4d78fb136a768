//! The launchpad: deploy an agent instance for a wallet and hand back the
//! delegated-signer challenge its owner has to approve.

mod server;
pub mod types;

use std::sync::Arc;

use secrecy::SecretString;

pub use server::{LaunchpadServer, router, start_server};

use crate::config::{AgentCredentials, Config};
use crate::control_plane::{ControlPlaneClient, InstanceSummary};
use crate::error::{ConfigError, Error};
use crate::instance::InitializeRequest;
use crate::launchpad::types::{ApproveSignatureRequest, ApproveTransactionRequest, DeployResponse};
use crate::orchestrator::{DeploymentOrchestrator, DeploymentRecord};
use crate::signer::DelegatedSignerCoordinator;

/// Wallet-custodian access needed for any deploy.
pub struct Custodian {
    pub api_key: SecretString,
    pub signer: DelegatedSignerCoordinator,
}

/// Deploy-time settings that do not belong to the orchestrator.
#[derive(Debug, Clone)]
pub struct LaunchpadOptions {
    pub credentials: AgentCredentials,
    pub chain: String,
    /// Leave a failed instance up for debugging.
    pub keep_failed_instance: bool,
}

pub struct LaunchpadService {
    orchestrator: Arc<DeploymentOrchestrator>,
    custodian: Option<Custodian>,
    control_plane: Option<ControlPlaneClient>,
    options: LaunchpadOptions,
}

impl LaunchpadService {
    pub fn new(
        orchestrator: Arc<DeploymentOrchestrator>,
        custodian: Option<Custodian>,
        control_plane: Option<ControlPlaneClient>,
        options: LaunchpadOptions,
    ) -> Self {
        Self {
            orchestrator,
            custodian,
            control_plane,
            options,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let custodian = config
            .custodian
            .as_ref()
            .map(|custodian| {
                Ok::<_, ConfigError>(Custodian {
                    api_key: custodian.api_key.clone(),
                    signer: DelegatedSignerCoordinator::new(custodian)?,
                })
            })
            .transpose()?;
        let control_plane = if config.control_plane.cloud_enabled() {
            Some(ControlPlaneClient::new(&config.control_plane)?)
        } else {
            None
        };

        Ok(Self::new(
            Arc::new(DeploymentOrchestrator::from_config(config)?),
            custodian,
            control_plane,
            LaunchpadOptions {
                credentials: config.credentials.clone(),
                chain: config.deployment.chain.clone(),
                keep_failed_instance: config.deployment.keep_failed_instance,
            },
        ))
    }

    pub fn orchestrator(&self) -> &Arc<DeploymentOrchestrator> {
        &self.orchestrator
    }

    fn custodian(&self) -> Result<&Custodian, ConfigError> {
        self.custodian
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CROSSMINT_SERVER_API_KEY".to_string(),
                hint: "Set a server-side custodian API key to register delegated signers."
                    .to_string(),
            })
    }

    /// Ensure an instance is running, derive the wallet's agent signer in it
    /// and register that signer with the custodian.
    pub async fn deploy(
        &self,
        wallet_address: &str,
        wallet_signer_type: &str,
    ) -> Result<DeployResponse, Error> {
        let result = self.deploy_inner(wallet_address, wallet_signer_type).await;
        if let Err(e) = &result {
            tracing::error!(wallet = %wallet_address, error = %e, "Deploy failed");
            if !self.options.keep_failed_instance {
                self.orchestrator.stop().await;
            }
        }
        result
    }

    async fn deploy_inner(
        &self,
        wallet_address: &str,
        wallet_signer_type: &str,
    ) -> Result<DeployResponse, Error> {
        let custodian = self.custodian()?;

        let record = self.orchestrator.start().await?;

        let request = InitializeRequest::new(wallet_address, custodian.api_key.clone())
            .with_credentials(&self.options.credentials)
            .with_chain(&self.options.chain);
        let agent_signer = self.orchestrator.initialize_agent(&request).await?;

        let outcome = custodian
            .signer
            .ensure_delegated_signer(
                wallet_address,
                &agent_signer,
                &self.options.chain,
                wallet_signer_type,
            )
            .await?;

        Ok(DeployResponse {
            success: true,
            container_id: record.instance_id,
            target_signer_locator: outcome.target_signer_locator,
            delegated_signer_message: outcome.pending_message,
            delegated_signer_id: outcome.request_id,
            delegated_signer_already_active: outcome.already_active,
        })
    }

    pub async fn stop(&self) {
        self.orchestrator.stop().await;
    }

    pub async fn status(&self) -> DeploymentRecord {
        self.orchestrator.record().await
    }

    pub async fn approve_signature(&self, request: &ApproveSignatureRequest) -> Result<(), Error> {
        self.custodian()?
            .signer
            .submit_approval(
                &request.signature,
                &request.signer_locator,
                &request.wallet_address,
                &request.signature_id,
                request.metadata.as_ref(),
            )
            .await?;
        Ok(())
    }

    pub async fn approve_transaction(
        &self,
        request: &ApproveTransactionRequest,
    ) -> Result<(), Error> {
        self.custodian()?
            .signer
            .submit_transaction_approval(
                &request.signature,
                &request.signer_locator,
                &request.wallet_address,
                &request.transaction_id,
            )
            .await?;
        Ok(())
    }

    /// Instances owned by the control-plane account.
    pub async fn list_agents(&self) -> Result<Vec<InstanceSummary>, Error> {
        let client = self
            .control_plane
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "PHALA_CLOUD_API_KEY".to_string(),
                hint: "Listing deployed agents needs a control-plane API key.".to_string(),
            })?;
        let user = client.current_user().await?;
        Ok(client.list_instances(&user.id).await?)
    }
}
