//! Custodian signer payloads, validated at the boundary.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SignerError;

/// `{signer_type}:{address}`, the custodian's resource key for a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerLocator {
    signer_type: String,
    address: String,
}

impl SignerLocator {
    pub fn new(signer_type: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            signer_type: signer_type.into(),
            address: address.into(),
        }
    }

    /// EVM-style signer types (`evm-passkey`, `evm-keypair`, ...) register
    /// per chain; Solana ones do not.
    pub fn is_evm(&self) -> bool {
        self.signer_type.contains("evm")
    }
}

impl fmt::Display for SignerLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.signer_type, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelegatedSignerStatus {
    Absent,
    AwaitingApproval,
    Active,
}

/// Status reported by the custodian for an approval target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSignerStatus {
    AwaitingApproval,
    Active,
    Other(String),
}

impl RemoteSignerStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "awaiting-approval" => Self::AwaitingApproval,
            "active" | "success" => Self::Active,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignerResponse {
    #[serde(default)]
    chains: Option<ChainTargets>,
    #[serde(default)]
    transaction: Option<ApprovalTarget>,
}

/// Per-chain approval targets in the order the custodian sent them.
#[derive(Debug)]
struct ChainTargets(Vec<(String, ApprovalTarget)>);

impl ChainTargets {
    /// The entry for `chain`, else the first one listed.
    fn select(self, chain: &str) -> Option<ApprovalTarget> {
        let mut entries = self.0;
        let index = entries
            .iter()
            .position(|(name, _)| name == chain)
            .unwrap_or_default();
        (index < entries.len()).then(|| entries.swap_remove(index).1)
    }
}

impl<'de> Deserialize<'de> for ChainTargets {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChainTargetsVisitor;

        impl<'de> Visitor<'de> for ChainTargetsVisitor {
            type Value = ChainTargets;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of chain name to approval target")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or_default());
                while let Some(entry) = map.next_entry::<String, ApprovalTarget>()? {
                    entries.push(entry);
                }
                Ok(ChainTargets(entries))
            }
        }

        deserializer.deserialize_map(ChainTargetsVisitor)
    }
}

#[derive(Debug, Deserialize)]
struct ApprovalTarget {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    approvals: Option<Approvals>,
}

#[derive(Debug, Deserialize)]
struct Approvals {
    #[serde(default)]
    pending: Vec<PendingApproval>,
}

#[derive(Debug, Deserialize)]
struct PendingApproval {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    signer: Option<String>,
}

/// A signer registration known to the custodian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerRecord {
    pub request_id: String,
    pub status: RemoteSignerStatus,
    pub pending_message: Option<String>,
    pub target_signer_locator: Option<String>,
}

/// Outcome of a signer lookup. Malformed bodies are folded into `Absent` by
/// the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerLookup {
    Absent,
    Found(SignerRecord),
}

impl SignerRecord {
    /// EVM signers (`chain` is `Some`) carry one approval target per chain;
    /// the configured chain wins, otherwise the first listed one. Solana
    /// signers carry a single `transaction`.
    pub(crate) fn parse(body: &str, chain: Option<&str>) -> Result<Self, SignerError> {
        let response: SignerResponse =
            serde_json::from_str(body).map_err(|e| SignerError::Parse(e.to_string()))?;
        let target = match chain {
            Some(chain) => response.chains.and_then(|chains| chains.select(chain)),
            None => response.transaction,
        };
        let target = target
            .ok_or_else(|| SignerError::Parse("no approval target in signer payload".to_string()))?;

        let status = target
            .status
            .as_deref()
            .map(RemoteSignerStatus::parse)
            .ok_or_else(|| SignerError::Parse("approval target has no status".to_string()))?;
        let pending = target
            .approvals
            .and_then(|approvals| approvals.pending.into_iter().next());
        let (pending_message, target_signer_locator) = match pending {
            Some(p) => (p.message, p.signer),
            None => (None, None),
        };

        Ok(Self {
            request_id: target.id.unwrap_or_default(),
            status,
            pending_message,
            target_signer_locator,
        })
    }
}

/// Result of `ensure_delegated_signer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedSignerOutcome {
    pub status: DelegatedSignerStatus,
    /// Message the wallet owner must sign; empty when already active.
    pub pending_message: String,
    pub request_id: String,
    pub target_signer_locator: String,
    pub already_active: bool,
}

impl DelegatedSignerOutcome {
    pub(crate) fn from_record(record: SignerRecord, locator: &SignerLocator) -> Self {
        let target_signer_locator = record
            .target_signer_locator
            .unwrap_or_else(|| locator.to_string());
        if record.status == RemoteSignerStatus::Active {
            return Self {
                status: DelegatedSignerStatus::Active,
                pending_message: String::new(),
                request_id: String::new(),
                target_signer_locator,
                already_active: true,
            };
        }
        Self {
            status: DelegatedSignerStatus::AwaitingApproval,
            pending_message: record.pending_message.unwrap_or_default(),
            request_id: record.request_id,
            target_signer_locator,
            already_active: false,
        }
    }
}

/// Wallet owner's signature over a pending approval message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApprovalSignature {
    /// Passkey (P-256) signature components.
    Evm { r: String, s: String },
    /// Encoded signature bytes (base58 for Solana, hex for EVM keypairs).
    Encoded(String),
}

#[derive(Debug, Serialize)]
pub(crate) struct ApprovalBody<'a> {
    pub approvals: [ApprovalEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
pub(crate) struct ApprovalEntry<'a> {
    pub signer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a serde_json::Value>,
    pub signature: &'a ApprovalSignature,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSignerBody<'a> {
    pub signer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn locator_formats_type_and_address() {
        let locator = SignerLocator::new("evm-keypair", "0xabc");
        assert_eq!(locator.to_string(), "evm-keypair:0xabc");
        assert!(locator.is_evm());
        assert!(!SignerLocator::new("solana-keypair", "7Ec").is_evm());
    }

    #[test]
    fn evm_payload_reads_chain_target() {
        let body = json!({
            "chains": {
                "base-sepolia": {
                    "id": "sig-1",
                    "status": "awaiting-approval",
                    "approvals": {"pending": [{"message": "0xdead", "signer": "evm-passkey:0xowner"}]}
                }
            }
        })
        .to_string();

        let record = SignerRecord::parse(&body, Some("base-sepolia")).unwrap();
        assert_eq!(
            record,
            SignerRecord {
                request_id: "sig-1".to_string(),
                status: RemoteSignerStatus::AwaitingApproval,
                pending_message: Some("0xdead".to_string()),
                target_signer_locator: Some("evm-passkey:0xowner".to_string()),
            }
        );
    }

    #[test]
    fn evm_payload_prefers_configured_chain() {
        let body = r#"{
            "chains": {
                "base-sepolia": {"id": "sig-base", "status": "active"},
                "arbitrum": {"id": "sig-arb", "status": "awaiting-approval"}
            }
        }"#;

        let arbitrum = SignerRecord::parse(body, Some("arbitrum")).unwrap();
        assert_eq!(arbitrum.request_id, "sig-arb");
        assert_eq!(arbitrum.status, RemoteSignerStatus::AwaitingApproval);

        let base = SignerRecord::parse(body, Some("base-sepolia")).unwrap();
        assert_eq!(base.request_id, "sig-base");

        // Unknown chain: first entry as sent, not alphabetical.
        let fallback = SignerRecord::parse(body, Some("optimism")).unwrap();
        assert_eq!(fallback.request_id, "sig-base");
    }

    #[test]
    fn solana_payload_uses_transaction() {
        let body = json!({
            "transaction": {"id": "tx-1", "status": "success"}
        })
        .to_string();

        let record = SignerRecord::parse(&body, None).unwrap();
        assert_eq!(record.status, RemoteSignerStatus::Active);
        assert_eq!(record.pending_message, None);
    }

    #[test]
    fn payload_without_target_is_a_parse_error() {
        assert!(matches!(
            SignerRecord::parse(r#"{"chains":{}}"#, Some("base")),
            Err(SignerError::Parse(_))
        ));
        assert!(matches!(
            SignerRecord::parse(r#"{"chains":{"x":{"id":"1","status":"active"}}}"#, None),
            Err(SignerError::Parse(_))
        ));
        assert!(matches!(SignerRecord::parse("", Some("base")), Err(SignerError::Parse(_))));
    }

    #[test]
    fn active_record_short_circuits() {
        let locator = SignerLocator::new("evm-keypair", "0xagent");
        let outcome = DelegatedSignerOutcome::from_record(
            SignerRecord {
                request_id: "sig-1".to_string(),
                status: RemoteSignerStatus::Active,
                pending_message: None,
                target_signer_locator: None,
            },
            &locator,
        );
        assert!(outcome.already_active);
        assert_eq!(outcome.pending_message, "");
        assert_eq!(outcome.target_signer_locator, "evm-keypair:0xagent");
    }

    #[test]
    fn approval_body_shape() {
        let signature = ApprovalSignature::Evm {
            r: "0x01".to_string(),
            s: "0x02".to_string(),
        };
        let metadata = json!({"challengeIndex": 23});
        let body = ApprovalBody {
            approvals: [ApprovalEntry {
                signer: "evm-passkey:0xowner",
                metadata: Some(&metadata),
                signature: &signature,
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"approvals": [{
                "signer": "evm-passkey:0xowner",
                "metadata": {"challengeIndex": 23},
                "signature": {"r": "0x01", "s": "0x02"}
            }]})
        );

        let solana: ApprovalSignature = serde_json::from_value(json!("5Kd3")).unwrap();
        assert_eq!(solana, ApprovalSignature::Encoded("5Kd3".to_string()));
    }
}
