//! Error types for the launchpad.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("Deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Delegated signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Instance error: {0}")]
    Instance(#[from] InstanceError),

    #[error("{0}")]
    InvalidRequest(String),
}

impl Error {
    /// Whether the caller supplied bad input (as opposed to an upstream failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the confidential-compute control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("{operation} request failed: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
        transient: bool,
    },

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} returned a malformed body: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

impl ControlPlaneError {
    /// 5xx responses and connection/timeout failures may be retried; 4xx and
    /// malformed bodies may not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { transient, .. } => *transient,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } => false,
        }
    }
}

/// Deployment lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Local runtime failed during {stage}: {reason}")]
    Local { stage: &'static str, reason: String },

    #[error("Deployment timeout: no deployment URL for instance {instance_id} after {attempts} attempts")]
    DeploymentTimeout { instance_id: String, attempts: u32 },

    #[error("Instance at {url} failed to become ready after {attempts} attempts")]
    ReadinessTimeout { url: String, attempts: u32 },

    #[error("No deployment is running")]
    NotRunning,

    #[error("Instance initialization failed: {reason}")]
    Initialization { reason: String },
}

/// Cryptographic failures. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Key exchange produced a non-contributory shared secret")]
    NonContributory,

    #[error("Cipher failure: {0}")]
    Cipher(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Failed to serialize secrets: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delegated-signer handshake errors.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Malformed lookup body. Recovered locally by falling back to creation.
    #[error("Unrecognized delegated signer payload: {0}")]
    Parse(String),

    #[error("Signer lookup for {locator} failed: {reason}")]
    Lookup { locator: String, reason: String },

    #[error("Signer creation for {locator} failed: {reason}")]
    Creation { locator: String, reason: String },

    #[error("Approval submission for {target_id} failed: {reason}")]
    ApprovalSubmission { target_id: String, reason: String },
}

/// Errors raised inside the confidential instance.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("Root-of-trust request failed: {0}")]
    RootOfTrust(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Instance server failed to start: {0}")]
    Startup(String),

    #[error("Agent launch failed: {0}")]
    AgentLaunch(String),
}

pub type Result<T> = std::result::Result<T, Error>;
