//! Capability trait for the OS service manager.

use async_trait::async_trait;

use crate::target::TargetError;

/// Observed state of a Windows service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    StartPending,
    /// The service is not installed on the target machine.
    Missing,
    /// Any other reported state, verbatim.
    Other(String),
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Stopped => write!(f, "stopped"),
            ServiceStatus::StartPending => write!(f, "start pending"),
            ServiceStatus::Missing => write!(f, "missing"),
            ServiceStatus::Other(state) => write!(f, "{state}"),
        }
    }
}

/// Minimal service-control surface the runner needs to guarantee the Agent
/// is up before any job mutation.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn status(&self, service: &str) -> Result<ServiceStatus, TargetError>;

    /// Set the service start mode to Automatic.
    async fn set_automatic_start(&self, service: &str) -> Result<(), TargetError>;

    async fn start(&self, service: &str) -> Result<(), TargetError>;
}
