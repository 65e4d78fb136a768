//! The service that runs inside the confidential instance, and the client the
//! orchestrator uses to reach it.
//!
//! ```text
//! POST /api/initialize ──► InstanceSession ──► KeyDerivationService ──► RootKeyProvider
//!                                │                                      (tappd DeriveKey)
//!                                └──► AgentLauncher (optional)
//! ```

mod agent;
mod client;
pub mod derive;
pub mod protocol;
pub mod root_key;
mod server;
mod session;

pub use agent::{AgentLauncher, RunningAgent};
pub use client::InstanceClient;
pub use derive::{DerivedKeyMaterial, KeyDerivationService, WalletFormat};
pub use protocol::InitializeRequest;
pub use root_key::{RootKeyProvider, TappdClient};
pub use server::{InstanceServer, router, start_server};
pub use session::{ActiveSigner, InstanceSession};
