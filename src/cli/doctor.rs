//! `agent-launchpad doctor`: checks what a deploy is about to depend on.
//!
//! Cloud mode needs the control-plane account and the custodian; local mode
//! additionally needs a Docker engine and compose. Checks that the selected
//! mode does not need are reported as such instead of failing.

use std::net::TcpListener;

use secrecy::ExposeSecret;

use crate::config::{Config, CustodianEnvironment, DEFAULT_REQUEST_TIMEOUT, LocalRuntimeConfig};
use crate::control_plane::ControlPlaneClient;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Ready(String),
    Blocked(String),
    NotNeeded(String),
}

/// Verdicts in the order they were printed.
#[derive(Debug, Default)]
struct Report {
    entries: Vec<(&'static str, Verdict)>,
}

impl Report {
    fn record(&mut self, name: &'static str, verdict: Verdict) {
        let (tag, detail) = match &verdict {
            Verdict::Ready(detail) => ("ok", detail),
            Verdict::Blocked(detail) => ("BLOCKED", detail),
            Verdict::NotNeeded(detail) => ("n/a", detail),
        };
        println!("  {tag:>7}  {name}: {detail}");
        self.entries.push((name, verdict));
    }

    fn blocked(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, verdict)| matches!(verdict, Verdict::Blocked(_)))
            .count()
    }

    fn ready(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, verdict)| matches!(verdict, Verdict::Ready(_)))
            .count()
    }
}

pub async fn run_doctor_command(strict: bool) -> anyhow::Result<()> {
    println!("agent-launchpad doctor\n");

    let http = reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()?;
    let mut report = Report::default();

    let config = match Config::from_env() {
        Ok(config) => {
            report.record("Configuration", Verdict::Ready("environment parsed".to_string()));
            Some(config)
        }
        Err(e) => {
            report.record("Configuration", Verdict::Blocked(e.to_string()));
            None
        }
    };

    if let Some(config) = &config {
        report.record("Deployment mode", deployment_mode(config));
        report.record("Compose file", compose_file(config));
        report.record(
            "Launchpad port",
            port_available(&config.server.host, config.server.port),
        );
        report.record("Control-plane account", control_plane_account(config).await);
        report.record("Custodian", custodian(&http, config).await);
    }

    let default_local = LocalRuntimeConfig::default();
    let local = config
        .as_ref()
        .map_or(&default_local, |config| &config.deployment.local);
    if needs_local_runtime(config.as_ref()) {
        report.record("Docker engine", docker_engine().await);
        report.record("Compose", compose_version(&local.compose_command).await);
    } else {
        let reason = || Verdict::NotNeeded("cloud deployments do not run containers locally".to_string());
        report.record("Docker engine", reason());
        report.record("Compose", reason());
    }

    println!("\n  {} ready, {} blocked", report.ready(), report.blocked());
    if strict && report.blocked() > 0 {
        anyhow::bail!("{} doctor check(s) blocked", report.blocked());
    }
    Ok(())
}

/// Local containers are needed unless the control plane is configured.
fn needs_local_runtime(config: Option<&Config>) -> bool {
    config.is_none_or(|config| !config.control_plane.cloud_enabled())
}

fn deployment_mode(config: &Config) -> Verdict {
    if config.control_plane.cloud_enabled() {
        Verdict::Ready(format!("cloud via {}", display_url(&config.control_plane.api_url)))
    } else {
        Verdict::Ready(format!(
            "local simulator on port {} (set PHALA_CLOUD_API_KEY to deploy to the cloud)",
            config.deployment.local.simulator_port
        ))
    }
}

fn compose_file(config: &Config) -> Verdict {
    match &config.deployment.compose_file {
        Some(path) if path.is_file() => Verdict::Ready(path.display().to_string()),
        Some(path) => Verdict::Blocked(format!("{} does not exist", path.display())),
        None if config.control_plane.cloud_enabled() => {
            Verdict::Blocked("LAUNCHPAD_COMPOSE_FILE is required for cloud deployments".to_string())
        }
        None => Verdict::NotNeeded("compose picks up the file in the working directory".to_string()),
    }
}

fn port_available(host: &str, port: u16) -> Verdict {
    match TcpListener::bind((host, port)) {
        Ok(_) => Verdict::Ready(format!("{host}:{port} is free")),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            Verdict::Blocked(format!("{host}:{port} is taken; set LAUNCHPAD_PORT"))
        }
        Err(e) => Verdict::Blocked(format!("cannot bind {host}:{port}: {e}")),
    }
}

/// Resolves the account behind the API key, which also proves the key works.
async fn control_plane_account(config: &Config) -> Verdict {
    if !config.control_plane.cloud_enabled() {
        return Verdict::NotNeeded("local mode".to_string());
    }
    let client = match ControlPlaneClient::new(&config.control_plane) {
        Ok(client) => client,
        Err(e) => return Verdict::Blocked(e.to_string()),
    };
    match client.current_user().await {
        Ok(user) => Verdict::Ready(format!("signed in as {}", user.username)),
        Err(e) => Verdict::Blocked(e.to_string()),
    }
}

async fn custodian(http: &reqwest::Client, config: &Config) -> Verdict {
    let Some(custodian) = &config.custodian else {
        return Verdict::Blocked(
            "CROSSMINT_SERVER_API_KEY is not set; deploys cannot register delegated signers"
                .to_string(),
        );
    };
    let environment = CustodianEnvironment::from_api_key(custodian.api_key.expose_secret());
    match reachable(http, &custodian.base_url).await {
        Verdict::Ready(status) => Verdict::Ready(format!("{environment:?} key, {status}")),
        other => other,
    }
}

/// Any answer below 500 means the service is up; auth is checked per call.
async fn reachable(http: &reqwest::Client, endpoint: &str) -> Verdict {
    let shown = display_url(endpoint);
    match http.get(endpoint.trim()).send().await {
        Ok(response) if response.status().is_server_error() => {
            Verdict::Blocked(format!("{shown} answered {}", response.status()))
        }
        Ok(response) => Verdict::Ready(format!("{shown} answered {}", response.status())),
        Err(e) if e.is_builder() => Verdict::Blocked(format!("invalid URL {shown}")),
        Err(e) => Verdict::Blocked(format!("{shown} unreachable: {e}")),
    }
}

async fn docker_engine() -> Verdict {
    let docker = match bollard::Docker::connect_with_local_defaults() {
        Ok(docker) => docker,
        Err(e) => return Verdict::Blocked(format!("no Docker socket: {e}")),
    };
    match docker.version().await {
        Ok(version) => Verdict::Ready(format!(
            "engine {}",
            version.version.unwrap_or_else(|| "unknown".to_string())
        )),
        Err(e) => Verdict::Blocked(format!("engine not responding: {e}")),
    }
}

async fn compose_version(compose_command: &[String]) -> Verdict {
    let Some((program, leading)) = compose_command.split_first() else {
        return Verdict::Blocked("LAUNCHPAD_COMPOSE_COMMAND is empty".to_string());
    };
    let output = tokio::process::Command::new(program)
        .args(leading)
        .arg("version")
        .stdin(std::process::Stdio::null())
        .output()
        .await;
    match output {
        Ok(output) if output.status.success() => Verdict::Ready(
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
        ),
        Ok(output) => Verdict::Blocked(format!(
            "`{} version` exited with {}",
            compose_command.join(" "),
            output.status
        )),
        Err(e) => Verdict::Blocked(format!("cannot run {program}: {e}")),
    }
}

/// URL without userinfo, for printing.
fn display_url(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}
