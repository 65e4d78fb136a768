//! Agent launchpad: deploys a wallet-controlled agent into a confidential VM,
//! derives its signing key inside the VM and registers that key with the
//! wallet custodian as a delegated signer.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod instance;
pub mod launchpad;
pub mod orchestrator;
pub mod redact;
pub mod secrets;
pub mod signer;

pub use config::Config;
pub use error::{Error, Result};
