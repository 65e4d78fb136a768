//! Command-line surface.

mod doctor;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::SecretString;

pub use doctor::run_doctor_command;

use crate::config::{Config, InstanceConfig};
use crate::instance::{AgentLauncher, InstanceSession, KeyDerivationService, TappdClient};
use crate::launchpad::LaunchpadService;
use crate::signer::{ApprovalSignature, DelegatedSignerCoordinator, sign_solana_message};

#[derive(Parser, Debug)]
#[command(name = "agent-launchpad", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the launchpad HTTP API.
    Serve,

    /// Run the key-derivation service inside a confidential instance.
    Instance,

    /// Deploy an agent for a wallet, print the signer challenge and keep the
    /// instance up until Ctrl-C.
    Deploy {
        #[arg(long)]
        wallet: String,
        /// Wallet owner's signer type, e.g. `evm-passkey` or `solana-keypair`.
        #[arg(long)]
        signer_type: String,
    },

    /// List instances owned by the control-plane account.
    Agents,

    /// Approve a pending delegated-signer request.
    Approve {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        signer: String,
        #[arg(long)]
        signature_id: String,
        /// JSON `{"r":..,"s":..}` or an encoded signature string.
        #[arg(long)]
        signature: String,
        /// Optional JSON metadata forwarded with the approval.
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Approve a pending wallet transaction.
    ApproveTransaction {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        signer: String,
        #[arg(long)]
        transaction_id: String,
        #[arg(long)]
        signature: String,
    },

    /// Sign a base58 message with a Solana keypair.
    SignSolana {
        #[arg(long)]
        message: String,
        #[arg(long, env = "SOLANA_SIGNER_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
    },

    /// Check configuration and deployment prerequisites.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve => serve().await,
        Command::Instance => instance().await,
        Command::Deploy {
            wallet,
            signer_type,
        } => deploy(&wallet, &signer_type).await,
        Command::Agents => {
            let service = LaunchpadService::from_config(&Config::from_env()?)?;
            print_json(&service.list_agents().await?)
        }
        Command::Approve {
            wallet,
            signer,
            signature_id,
            signature,
            metadata,
        } => {
            let metadata = metadata
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()
                .context("--metadata must be JSON")?;
            coordinator()?
                .submit_approval(
                    &parse_signature(&signature),
                    &signer,
                    &wallet,
                    &signature_id,
                    metadata.as_ref(),
                )
                .await?;
            println!("Approval submitted for {signature_id}");
            Ok(())
        }
        Command::ApproveTransaction {
            wallet,
            signer,
            transaction_id,
            signature,
        } => {
            coordinator()?
                .submit_transaction_approval(
                    &parse_signature(&signature),
                    &signer,
                    &wallet,
                    &transaction_id,
                )
                .await?;
            println!("Approval submitted for {transaction_id}");
            Ok(())
        }
        Command::SignSolana {
            message,
            private_key,
        } => {
            let signature = sign_solana_message(&message, &SecretString::from(private_key))?;
            println!("{signature}");
            Ok(())
        }
        Command::Doctor { strict } => run_doctor_command(strict).await,
    }
}

fn coordinator() -> anyhow::Result<DelegatedSignerCoordinator> {
    let config = Config::from_env()?;
    Ok(DelegatedSignerCoordinator::new(config.require_custodian()?)?)
}

/// JSON objects are passkey components; anything else is taken verbatim.
fn parse_signature(raw: &str) -> ApprovalSignature {
    serde_json::from_str(raw).unwrap_or_else(|_| ApprovalSignature::Encoded(raw.trim().to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn bind_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("invalid bind host {host:?}"))?;
    Ok(SocketAddr::new(ip, port))
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let service = Arc::new(LaunchpadService::from_config(&config)?);
    let addr = bind_addr(&config.server.host, config.server.port)?;
    let mut server =
        crate::launchpad::start_server(addr, service.clone(), &config.server.allowed_origins)
            .await
            .with_context(|| format!("failed to start launchpad API on {addr}"))?;

    println!("Launchpad API listening on http://{}", server.addr);
    tokio::signal::ctrl_c().await?;

    server.shutdown();
    service.stop().await;
    Ok(())
}

async fn instance() -> anyhow::Result<()> {
    let config = InstanceConfig::from_env()?;
    let root = TappdClient::new(&config.root_of_trust_endpoint, config.root_of_trust_timeout)?;
    let launcher = config.agent_command.as_deref().and_then(AgentLauncher::new);
    let session = Arc::new(InstanceSession::new(
        KeyDerivationService::new(Arc::new(root)),
        launcher,
    ));

    let addr = bind_addr(&config.host, config.port)?;
    let mut server = crate::instance::start_server(addr, session).await?;
    tracing::info!(
        addr = %server.addr,
        root_of_trust = %config.root_of_trust_endpoint,
        "Instance service ready"
    );

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    Ok(())
}

async fn deploy(wallet: &str, signer_type: &str) -> anyhow::Result<()> {
    let service = LaunchpadService::from_config(&Config::from_env()?)?;
    let response = service.deploy(wallet, signer_type).await?;
    print_json(&response)?;

    println!("\nInstance is running. Press Ctrl-C to stop it.");
    tokio::signal::ctrl_c().await?;
    service.stop().await;
    Ok(())
}
