//! Confidential-compute control plane: attestation keys, instance creation
//! and network status.

mod client;
pub mod types;

pub use client::ControlPlaneClient;
pub use types::{
    AttestationPubkey, ComposeManifest, ControlPlaneUser, HostedInstance, InstanceNetwork,
    InstanceSummary, VmConfiguration,
};
