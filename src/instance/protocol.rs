//! Request/response shapes of the confidential-instance HTTP API.

use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AgentCredentials;

pub const HEADER_WALLET_ADDRESS: &str = "x-wallet-address";
pub const HEADER_API_KEY: &str = "x-api-key";
pub const HEADER_ALCHEMY_API_KEY: &str = "x-alchemy-api-key";
pub const HEADER_COINGECKO_API_KEY: &str = "x-coingecko-api-key";
pub const HEADER_OPENAI_API_KEY: &str = "x-openai-api-key";
pub const HEADER_SOLANA_RPC_URL: &str = "x-solana-rpc-url";
pub const HEADER_CHAIN: &str = "x-chain";

pub const MISSING_HEADERS_ERROR: &str =
    "missing 'x-wallet-address' or 'x-api-key' header in request for initialization";
pub const DERIVATION_FAILED_ERROR: &str = "Failed to generate public key";

/// Everything `/api/initialize` needs, carried as request headers.
#[derive(Debug, Clone)]
pub struct InitializeRequest {
    pub wallet_address: String,
    /// Custodian server key handed to the agent.
    pub api_key: SecretString,
    pub alchemy_api_key: Option<SecretString>,
    pub coingecko_api_key: Option<SecretString>,
    pub openai_api_key: Option<SecretString>,
    pub solana_rpc_url: Option<String>,
    pub chain: Option<String>,
}

impl InitializeRequest {
    pub fn new(wallet_address: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            api_key,
            alchemy_api_key: None,
            coingecko_api_key: None,
            openai_api_key: None,
            solana_rpc_url: None,
            chain: None,
        }
    }

    pub fn with_credentials(mut self, credentials: &AgentCredentials) -> Self {
        self.alchemy_api_key = credentials.alchemy_api_key.clone();
        self.coingecko_api_key = credentials.coingecko_api_key.clone();
        self.openai_api_key = credentials.openai_api_key.clone();
        self.solana_rpc_url = credentials.solana_rpc_url.clone();
        self
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    /// Header pairs in wire form. Unset optional values are omitted.
    pub(crate) fn header_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (HEADER_WALLET_ADDRESS, self.wallet_address.clone()),
            (HEADER_API_KEY, self.api_key.expose_secret().to_string()),
        ];
        let optional = [
            (HEADER_ALCHEMY_API_KEY, self.alchemy_api_key.as_ref().map(|s| s.expose_secret().to_string())),
            (HEADER_COINGECKO_API_KEY, self.coingecko_api_key.as_ref().map(|s| s.expose_secret().to_string())),
            (HEADER_OPENAI_API_KEY, self.openai_api_key.as_ref().map(|s| s.expose_secret().to_string())),
            (HEADER_SOLANA_RPC_URL, self.solana_rpc_url.clone()),
            (HEADER_CHAIN, self.chain.clone()),
        ];
        pairs.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, v))),
        );
        pairs
    }

    /// `None` when the wallet address or API key header is missing or blank.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let secret = |name: &str| text(name).map(SecretString::from);

        Some(Self {
            wallet_address: text(HEADER_WALLET_ADDRESS)?,
            api_key: secret(HEADER_API_KEY)?,
            alchemy_api_key: secret(HEADER_ALCHEMY_API_KEY),
            coingecko_api_key: secret(HEADER_COINGECKO_API_KEY),
            openai_api_key: secret(HEADER_OPENAI_API_KEY),
            solana_rpc_url: text(HEADER_SOLANA_RPC_URL),
            chain: text(HEADER_CHAIN),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub status: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
