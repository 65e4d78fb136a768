//! Delegated-signer handshake with the wallet custodian.
//!
//! ```text
//! lookup ──► Found(awaiting-approval) ──► return pending message
//!        ├─► Found(active)            ──► already_active
//!        └─► Absent / other status    ──► create ──► pending message
//!                                                    │
//!                     owner signs ──► submit_approval ┘──► active
//! ```

mod coordinator;
mod solana;
pub mod types;

pub use coordinator::DelegatedSignerCoordinator;
pub use solana::sign_solana_message;
pub use types::{
    ApprovalSignature, DelegatedSignerOutcome, DelegatedSignerStatus, SignerLocator, SignerLookup,
    SignerRecord,
};
