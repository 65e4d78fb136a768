//! Launchpad API request/response bodies.

use serde::{Deserialize, Serialize};

use crate::control_plane::InstanceSummary;
use crate::orchestrator::DeploymentRecord;
use crate::signer::ApprovalSignature;

pub const MISSING_DEPLOY_FIELDS: &str = "body must contain smartWalletAddress and walletSignerType";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub smart_wallet_address: Option<String>,
    pub wallet_signer_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub success: bool,
    pub container_id: Option<String>,
    pub target_signer_locator: String,
    pub delegated_signer_message: String,
    pub delegated_signer_id: String,
    pub delegated_signer_already_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveSignatureRequest {
    pub signature: ApprovalSignature,
    pub signer_locator: String,
    pub wallet_address: String,
    pub signature_id: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveTransactionRequest {
    pub signature: ApprovalSignature,
    pub signer_locator: String,
    pub wallet_address: String,
    pub transaction_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub success: bool,
    pub agents: Vec<InstanceSummary>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub deployment: DeploymentRecord,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
