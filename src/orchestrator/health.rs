//! Readiness checks against a deployed instance's `/api/health` endpoint.

use std::error::Error as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DeploymentError;
use crate::orchestrator::BackoffPolicy;

pub const HEALTH_PATH: &str = "/api/health";

/// Typed outcome of a single health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Ready,
    /// Reachable, but the payload was not `{"status":"ok"}`.
    NotReady,
    InvalidUrl,
    DnsFailure,
    ConnectFailure,
    Timeout,
    HttpFailure,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NotReady => "not_ready",
            Self::InvalidUrl => "invalid_url",
            Self::DnsFailure => "dns_failure",
            Self::ConnectFailure => "connect_failure",
            Self::Timeout => "timeout",
            Self::HttpFailure => "http_failure",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub url: String,
    pub state: HealthState,
    pub detail: String,
    pub http_status: Option<u16>,
}

impl HealthCheck {
    pub fn is_ready(&self) -> bool {
        self.state == HealthState::Ready
    }
}

#[derive(Deserialize)]
struct HealthBody {
    status: String,
}

/// Query `{base_url}/api/health` once, bounded by `timeout`.
pub async fn check_health(client: &reqwest::Client, base_url: &str, timeout: Duration) -> HealthCheck {
    let url = format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/'));
    let outcome = |state: HealthState, detail: String, http_status: Option<u16>| HealthCheck {
        url: url.clone(),
        state,
        detail,
        http_status,
    };

    if reqwest::Url::parse(&url).is_err() {
        return outcome(HealthState::InvalidUrl, "URL parse failed".to_string(), None);
    }

    let response = match client.get(&url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(error) => return outcome(classify_transport_error(&error), error.to_string(), None),
    };

    let status = response.status();
    if !status.is_success() {
        return outcome(
            HealthState::HttpFailure,
            format!("HTTP {}", status.as_u16()),
            Some(status.as_u16()),
        );
    }

    match response.json::<HealthBody>().await {
        Ok(body) if body.status == "ok" => {
            outcome(HealthState::Ready, "ok".to_string(), Some(status.as_u16()))
        }
        Ok(body) => outcome(
            HealthState::NotReady,
            format!("status {:?}", body.status),
            Some(status.as_u16()),
        ),
        Err(error) if error.is_timeout() => {
            outcome(HealthState::Timeout, error.to_string(), Some(status.as_u16()))
        }
        Err(error) => outcome(
            HealthState::NotReady,
            format!("unexpected body: {error}"),
            Some(status.as_u16()),
        ),
    }
}

/// Poll until the instance reports ready, sleeping `policy.delay_for(n)`
/// after each failed attempt.
pub async fn wait_until_ready(
    client: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
    policy: &BackoffPolicy,
) -> Result<(), DeploymentError> {
    for attempt in 0..policy.max_attempts {
        let check = check_health(client, base_url, timeout).await;
        if check.is_ready() {
            tracing::info!(url = %check.url, attempt = attempt + 1, "Instance is ready");
            return Ok(());
        }

        let delay = policy.delay_for(attempt);
        tracing::debug!(
            url = %check.url,
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            state = check.state.as_str(),
            detail = %check.detail,
            delay_ms = delay.as_millis() as u64,
            "Instance not ready yet"
        );
        tokio::time::sleep(delay).await;
    }

    Err(DeploymentError::ReadinessTimeout {
        url: base_url.to_string(),
        attempts: policy.max_attempts,
    })
}

fn classify_transport_error(error: &reqwest::Error) -> HealthState {
    if error.is_timeout() {
        return HealthState::Timeout;
    }

    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<std::io::Error>() {
            return match io_error.kind() {
                std::io::ErrorKind::NotFound => HealthState::DnsFailure,
                _ => HealthState::ConnectFailure,
            };
        }
        source = err.source();
    }

    let lowered = error.to_string().to_ascii_lowercase();
    if lowered.contains("dns")
        || lowered.contains("lookup")
        || lowered.contains("name or service not known")
        || lowered.contains("no such host")
    {
        HealthState::DnsFailure
    } else {
        HealthState::ConnectFailure
    }
}
