use ed25519_dalek::{Signer as _, SigningKey};
use secrecy::{ExposeSecret, SecretString};

use crate::error::CryptoError;

/// Sign a base58 approval message with a base58 Ed25519 key and return the
/// base58 detached signature.
///
/// Accepts the 64-byte keypair form (seed followed by public key) or a bare
/// 32-byte seed.
pub fn sign_solana_message(
    message_b58: &str,
    secret_key_b58: &SecretString,
) -> Result<String, CryptoError> {
    let message = bs58::decode(message_b58.trim())
        .into_vec()
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("message is not base58: {e}")))?;
    let secret = bs58::decode(secret_key_b58.expose_secret().trim())
        .into_vec()
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("secret key is not base58: {e}")))?;

    let signing_key = match secret.len() {
        64 => {
            let bytes: [u8; 64] = secret
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyMaterial("bad keypair length".to_string()))?;
            SigningKey::from_keypair_bytes(&bytes).map_err(|e| {
                CryptoError::InvalidKeyMaterial(format!("keypair halves do not match: {e}"))
            })?
        }
        32 => {
            let seed: [u8; 32] = secret
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyMaterial("bad seed length".to_string()))?;
            SigningKey::from_bytes(&seed)
        }
        other => {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "expected a 32 or 64 byte Ed25519 key, got {other} bytes"
            )));
        }
    };

    Ok(bs58::encode(signing_key.sign(&message).to_bytes()).into_string())
}
