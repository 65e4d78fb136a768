//! Process bootstrap: env files and tracing.
//!
//! File: `~/.agent-launchpad/.env` (standard dotenvy format)

use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "agent_launchpad=info,tower_http=warn";

/// Path to the launchpad-specific `.env` file: `~/.agent-launchpad/.env`.
pub fn launchpad_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent-launchpad")
        .join(".env")
}

/// Load `./.env`, then `~/.agent-launchpad/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.agent-launchpad/.env`
pub fn load_launchpad_env() {
    let _ = dotenvy::dotenv();
    load_env_file(&launchpad_env_path());
}

/// Load one env file if it exists. Returns whether anything was loaded.
pub fn load_env_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Warning: ignoring unreadable env file {}: {e}", path.display());
            false
        }
    }
}

/// Install the global tracing subscriber.
///
/// `LAUNCHPAD_LOG_FORMAT=json` switches to JSON lines for log shippers.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LAUNCHPAD_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("Warning: tracing already initialized: {e}");
    }
}
