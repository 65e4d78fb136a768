use clap::Parser;

use agent_launchpad::bootstrap;
use agent_launchpad::cli::{Cli, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::load_launchpad_env();
    bootstrap::init_tracing();

    run(Cli::parse()).await
}
