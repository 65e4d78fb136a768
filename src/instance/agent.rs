//! Launching the wallet agent process once a signer key exists.

use std::process::Stdio;

use secrecy::ExposeSecret;
use tokio::process::{Child, Command};

use crate::error::InstanceError;
use crate::instance::derive::DerivedKeyMaterial;
use crate::instance::protocol::InitializeRequest;

/// Spawns the configured agent command with the derived signer and
/// forwarded credentials in its environment.
#[derive(Debug, Clone)]
pub struct AgentLauncher {
    program: String,
    args: Vec<String>,
}

impl AgentLauncher {
    /// `None` for an empty command line.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn command(&self, signer: &DerivedKeyMaterial, request: &InitializeRequest) -> Command {
        let optional = |value: Option<&str>| value.unwrap_or_default().to_string();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("SIGNER_WALLET_SECRET_KEY", signer.secret().expose_secret())
            .env("CROSSMINT_SERVER_API_KEY", request.api_key.expose_secret())
            .env("SMART_WALLET_ADDRESS", &request.wallet_address)
            .env(
                "ALCHEMY_API_KEY_BASE_SEPOLIA",
                optional(request.alchemy_api_key.as_ref().map(|s| s.expose_secret())),
            )
            .env(
                "COINGECKO_API_KEY",
                optional(request.coingecko_api_key.as_ref().map(|s| s.expose_secret())),
            )
            .env(
                "OPENAI_API_KEY",
                optional(request.openai_api_key.as_ref().map(|s| s.expose_secret())),
            )
            .env("SOLANA_RPC_URL", optional(request.solana_rpc_url.as_deref()))
            .env("CHAIN", optional(request.chain.as_deref()))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }

    /// Spawn the agent for the request's wallet. The returned handle owns
    /// the process; dropping it kills the agent.
    pub fn launch(
        &self,
        signer: &DerivedKeyMaterial,
        request: &InitializeRequest,
    ) -> Result<RunningAgent, InstanceError> {
        let child = self
            .command(signer, request)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InstanceError::AgentLaunch(format!("{}: {e}", self.program)))?;
        let pid = child.id().unwrap_or_default();
        tracing::info!(pid, program = %self.program, wallet = %request.wallet_address, "Agent process started");

        Ok(RunningAgent {
            wallet_address: request.wallet_address.clone(),
            pid,
            child,
        })
    }
}

/// The agent process serving one wallet.
#[derive(Debug)]
pub struct RunningAgent {
    pub wallet_address: String,
    pub pid: u32,
    child: Child,
}

impl RunningAgent {
    /// Whether the process is still alive. Logs the exit status the first
    /// time it is observed.
    pub fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if status.success() {
                    tracing::info!(pid = self.pid, "Agent process exited");
                } else {
                    tracing::warn!(pid = self.pid, %status, "Agent process exited with failure");
                }
                false
            }
            Err(e) => {
                tracing::error!(pid = self.pid, error = %e, "Failed to check agent process");
                false
            }
        }
    }

    /// Kill the process and wait for it to exit.
    pub async fn stop(mut self) {
        if !self.is_running() {
            return;
        }
        match self.child.kill().await {
            Ok(()) => tracing::info!(pid = self.pid, wallet = %self.wallet_address, "Agent process stopped"),
            Err(e) => tracing::error!(pid = self.pid, error = %e, "Failed to stop agent process"),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn signer() -> DerivedKeyMaterial {
        DerivedKeyMaterial::Evm {
            address: "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".to_string(),
            private_key: SecretString::from("0xfeed"),
        }
    }

    #[test]
    fn empty_command_has_no_launcher() {
        assert!(AgentLauncher::new(&[]).is_none());
    }

    #[test]
    fn environment_carries_signer_and_credentials() {
        let launcher =
            AgentLauncher::new(&["pnpm".to_string(), "run".to_string(), "start:agent".to_string()])
                .unwrap();
        let request = InitializeRequest::new("0xwallet", SecretString::from("sk_staging_1"))
            .with_chain("base-sepolia");

        let command = launcher.command(&signer(), &request);
        let std_command = command.as_std();
        let env = |key: &str| {
            std_command
                .get_envs()
                .find(|(k, _)| *k == key)
                .and_then(|(_, v)| v)
                .map(|v| v.to_string_lossy().into_owned())
        };

        assert_eq!(std_command.get_program(), "pnpm");
        assert_eq!(env("SIGNER_WALLET_SECRET_KEY").as_deref(), Some("0xfeed"));
        assert_eq!(env("SMART_WALLET_ADDRESS").as_deref(), Some("0xwallet"));
        assert_eq!(env("CHAIN").as_deref(), Some("base-sepolia"));
        assert_eq!(env("OPENAI_API_KEY").as_deref(), Some(""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stopped_agent_is_reaped() {
        let launcher = AgentLauncher::new(&[
            "sh".to_string(),
            "-c".to_string(),
            "exec sleep 30".to_string(),
        ])
        .unwrap();
        let request = InitializeRequest::new("0xwallet", SecretString::from("k"));

        let mut agent = launcher.launch(&signer(), &request).unwrap();
        assert!(agent.is_running());
        assert_eq!(agent.wallet_address, "0xwallet");

        let pid = agent.pid;
        agent.stop().await;
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .unwrap();
        assert!(!alive.success());
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let launcher = AgentLauncher::new(&["/nonexistent/agent-binary".to_string()]).unwrap();
        let request = InitializeRequest::new("0xwallet", SecretString::from("k"));
        assert!(matches!(
            launcher.launch(&signer(), &request),
            Err(InstanceError::AgentLaunch(_))
        ));
    }
}
