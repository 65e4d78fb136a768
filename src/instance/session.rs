use tokio::sync::{Mutex, RwLock};

use crate::error::InstanceError;
use crate::instance::agent::{AgentLauncher, RunningAgent};
use crate::instance::derive::{DerivedKeyMaterial, KeyDerivationService};
use crate::instance::protocol::InitializeRequest;

/// Signer bound to the wallet this instance serves.
#[derive(Debug, Clone)]
pub struct ActiveSigner {
    pub wallet_address: String,
    pub material: DerivedKeyMaterial,
}

/// Process-lifetime signer state of one confidential instance.
///
/// One instance serves one wallet; re-initializing replaces the active
/// signer. At most one agent process is alive at a time.
pub struct InstanceSession {
    derivation: KeyDerivationService,
    launcher: Option<AgentLauncher>,
    active: RwLock<Option<ActiveSigner>>,
    agent: Mutex<Option<RunningAgent>>,
}

impl InstanceSession {
    pub fn new(derivation: KeyDerivationService, launcher: Option<AgentLauncher>) -> Self {
        Self {
            derivation,
            launcher,
            active: RwLock::new(None),
            agent: Mutex::new(None),
        }
    }

    /// Derive the wallet's signer, keep it in memory and start the agent.
    /// Returns the public address.
    pub async fn initialize(&self, request: &InitializeRequest) -> Result<String, InstanceError> {
        let material = self.derivation.derive(&request.wallet_address).await?;
        let public_key = material.public_address().to_string();

        {
            let mut active = self.active.write().await;
            if let Some(previous) = active.as_ref()
                && previous.wallet_address != request.wallet_address
            {
                tracing::warn!(
                    previous = %previous.wallet_address,
                    wallet = %request.wallet_address,
                    "Replacing signer for a different wallet"
                );
            }
            *active = Some(ActiveSigner {
                wallet_address: request.wallet_address.clone(),
                material: material.clone(),
            });
        }

        if let Some(launcher) = &self.launcher {
            self.supervise_agent(launcher, &material, request).await;
        }

        Ok(public_key)
    }

    /// Keep a live agent already serving this wallet, otherwise stop
    /// whatever runs and start a fresh one.
    async fn supervise_agent(
        &self,
        launcher: &AgentLauncher,
        material: &DerivedKeyMaterial,
        request: &InitializeRequest,
    ) {
        let mut agent = self.agent.lock().await;
        let reusable = match agent.as_mut() {
            Some(running) => {
                running.wallet_address == request.wallet_address && running.is_running()
            }
            None => false,
        };
        if reusable {
            tracing::info!(wallet = %request.wallet_address, "Agent already running");
            return;
        }

        if let Some(previous) = agent.take() {
            previous.stop().await;
        }
        match launcher.launch(material, request) {
            Ok(running) => *agent = Some(running),
            Err(e) => tracing::error!(error = %e, "Agent did not start; signer remains available"),
        }
    }

    /// Pid of the live agent process, if any.
    pub async fn agent_pid(&self) -> Option<u32> {
        let mut agent = self.agent.lock().await;
        agent
            .as_mut()
            .and_then(|running| running.is_running().then_some(running.pid))
    }

    pub async fn public_key(&self) -> Option<String> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|signer| signer.material.public_address().to_string())
    }

    pub async fn active_signer(&self) -> Option<ActiveSigner> {
        self.active.read().await.clone()
    }
}
