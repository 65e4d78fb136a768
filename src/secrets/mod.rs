//! Encryption of deploy-time secrets against an attested instance key.
//!
//! The bundle is `ephemeral_pk (32) || nonce (12) || ciphertext+tag`, hex
//! encoded. The raw X25519 shared secret is the AES-256-GCM key. Only the
//! holder of the attested private key can open it; this side never decrypts.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::CryptoError;

pub const X25519_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// One environment variable destined for the confidential instance.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for EnvVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvVar")
            .field("key", &self.key)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct EnvPayload<'a> {
    env: &'a [EnvVar],
}

/// Hex-encoded sealed secret bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecretBundle(String);

impl EncryptedSecretBundle {
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// Seal `secrets` for the holder of `remote_public_key_hex`.
///
/// A fresh ephemeral key pair and nonce are generated per call, so sealing the
/// same input twice yields different bundles.
pub fn encrypt_secrets(
    secrets: &[EnvVar],
    remote_public_key_hex: &str,
) -> Result<EncryptedSecretBundle, CryptoError> {
    let remote = parse_x25519_public_key(remote_public_key_hex)?;
    let plaintext = serde_json::to_vec(&EnvPayload { env: secrets })?;

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&remote);
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    let cipher = Aes256Gcm::new_from_slice(shared.as_bytes())
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|_| CryptoError::Cipher("AES-256-GCM encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(X25519_KEY_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);

    Ok(EncryptedSecretBundle(hex::encode(sealed)))
}

fn parse_x25519_public_key(raw: &str) -> Result<PublicKey, CryptoError> {
    let trimmed = raw.trim();
    let hex_body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_body)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("not valid hex: {e}")))?;
    let bytes: [u8; X25519_KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
        CryptoError::InvalidPublicKey(format!(
            "expected {X25519_KEY_LEN} bytes, got {}",
            v.len()
        ))
    })?;
    Ok(PublicKey::from(bytes))
}

/// Open a bundle with the attested private key. Mirrors what the instance's
/// key-management side does; only used to check the sealing format.
#[cfg(test)]
pub(crate) fn decrypt_secrets(
    bundle_hex: &str,
    private_key: &x25519_dalek::StaticSecret,
) -> Result<Vec<EnvVar>, CryptoError> {
    #[derive(Deserialize)]
    struct OwnedPayload {
        env: Vec<EnvVar>,
    }

    let sealed = hex::decode(bundle_hex).map_err(|e| CryptoError::Cipher(e.to_string()))?;
    if sealed.len() < X25519_KEY_LEN + NONCE_LEN {
        return Err(CryptoError::Cipher("bundle too short".to_string()));
    }
    let (ephemeral, rest) = sealed.split_at(X25519_KEY_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    let ephemeral: [u8; X25519_KEY_LEN] = ephemeral
        .try_into()
        .map_err(|_| CryptoError::Cipher("bad ephemeral key".to_string()))?;

    let shared = private_key.diffie_hellman(&PublicKey::from(ephemeral));
    let cipher = Aes256Gcm::new_from_slice(shared.as_bytes())
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Cipher("AES-256-GCM decryption failed".to_string()))?;
    let payload: OwnedPayload = serde_json::from_slice(&plaintext)?;
    Ok(payload.env)
}
