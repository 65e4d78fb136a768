//! Deployment lifecycle: launching an instance locally or in the cloud and
//! gating on its readiness.

mod backoff;
mod deployment;
pub mod health;
pub mod local;

pub use backoff::BackoffPolicy;
pub use deployment::{
    DeploymentBackend, DeploymentMode, DeploymentOrchestrator, DeploymentRecord, DeploymentStatus,
};
pub use health::{HealthCheck, HealthState, check_health, wait_until_ready};
pub use local::{DockerRuntime, LocalRuntime};
