//! Chain-specific signer keys derived from the hardware root key.

use std::sync::Arc;

use k256::ecdsa::{SigningKey as EvmSigningKey, VerifyingKey};
use secrecy::SecretString;
use serde::Serialize;
use sha3::{Digest, Keccak256};

use crate::error::{CryptoError, InstanceError};
use crate::instance::root_key::RootKeyProvider;

/// Seed length for an Ed25519 key pair.
const ED25519_SEED_LEN: usize = 32;

/// Address format of a smart wallet, which decides the signer chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletFormat {
    Evm,
    Solana,
}

impl WalletFormat {
    /// `0x`-prefixed hex (any length, including none) is EVM; anything else
    /// is treated as a base58 Solana address.
    pub fn detect(address: &str) -> Self {
        match address.strip_prefix("0x") {
            Some(digits) if digits.bytes().all(|b| b.is_ascii_hexdigit()) => Self::Evm,
            _ => Self::Solana,
        }
    }
}

/// Key pair derived inside the instance. Only the public half ever leaves it.
#[derive(Debug, Clone)]
pub enum DerivedKeyMaterial {
    Evm {
        /// EIP-55 checksummed address.
        address: String,
        /// `0x`-prefixed hex private key.
        private_key: SecretString,
    },
    Solana {
        /// base58 public key.
        public_key: String,
        /// base58 64-byte secret key (seed followed by public key).
        secret_key: SecretString,
    },
}

impl DerivedKeyMaterial {
    pub fn public_address(&self) -> &str {
        match self {
            Self::Evm { address, .. } => address,
            Self::Solana { public_key, .. } => public_key,
        }
    }

    pub fn secret(&self) -> &SecretString {
        match self {
            Self::Evm { private_key, .. } => private_key,
            Self::Solana { secret_key, .. } => secret_key,
        }
    }

    pub fn format(&self) -> WalletFormat {
        match self {
            Self::Evm { .. } => WalletFormat::Evm,
            Self::Solana { .. } => WalletFormat::Solana,
        }
    }
}

/// Derives a deterministic signer for a wallet from the root key.
#[derive(Clone)]
pub struct KeyDerivationService {
    root: Arc<dyn RootKeyProvider>,
}

impl KeyDerivationService {
    pub fn new(root: Arc<dyn RootKeyProvider>) -> Self {
        Self { root }
    }

    /// Same `(root key, wallet address)` always gives the same signer.
    pub async fn derive(&self, wallet_address: &str) -> Result<DerivedKeyMaterial, InstanceError> {
        let raw = self.root.derive_key(wallet_address, "").await?;
        let material = match WalletFormat::detect(wallet_address) {
            WalletFormat::Evm => evm_account(&raw)?,
            WalletFormat::Solana => solana_account(&raw)?,
        };
        tracing::info!(
            format = ?material.format(),
            signer = %material.public_address(),
            "Derived signer key from root of trust"
        );
        Ok(material)
    }
}

/// Private key is `keccak256(raw)`.
fn evm_account(raw: &[u8]) -> Result<DerivedKeyMaterial, CryptoError> {
    let private_key = Keccak256::digest(raw);
    let signing_key = EvmSigningKey::from_slice(&private_key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("invalid secp256k1 scalar: {e}")))?;
    let address = ethereum_address(signing_key.verifying_key())?;

    Ok(DerivedKeyMaterial::Evm {
        address,
        private_key: SecretString::from(format!("0x{}", hex::encode(private_key))),
    })
}

/// The first 32 bytes of raw material are the Ed25519 seed.
fn solana_account(raw: &[u8]) -> Result<DerivedKeyMaterial, CryptoError> {
    let seed: [u8; ED25519_SEED_LEN] = raw
        .get(..ED25519_SEED_LEN)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            CryptoError::InvalidKeyMaterial(format!(
                "need at least {ED25519_SEED_LEN} bytes of root key material, got {}",
                raw.len()
            ))
        })?;
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);

    Ok(DerivedKeyMaterial::Solana {
        public_key: bs58::encode(signing_key.verifying_key().as_bytes()).into_string(),
        secret_key: SecretString::from(bs58::encode(signing_key.to_keypair_bytes()).into_string()),
    })
}

pub(crate) fn ethereum_address(key: &VerifyingKey) -> Result<String, CryptoError> {
    let encoded = key.to_encoded_point(false);
    let pubkey = encoded.as_bytes();
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(CryptoError::InvalidKeyMaterial(
            "unexpected public key encoding".to_string(),
        ));
    }
    let digest = Keccak256::digest(&pubkey[1..]);
    Ok(to_checksum_address(&hex::encode(&digest[12..])))
}

/// EIP-55 mixed-case checksum of a lowercase hex address (no prefix).
fn to_checksum_address(lower_hex: &str) -> String {
    let hash = hex::encode(Keccak256::digest(lower_hex.as_bytes()));
    let checksummed: String = lower_hex
        .chars()
        .zip(hash.chars())
        .map(|(c, h)| {
            if c.is_ascii_alphabetic() && h.to_digit(16).unwrap_or(0) >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();
    format!("0x{checksummed}")
}
