//! The convergence pass: service gate, install gate, then the declared job
//! list in order.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::service::{ServiceControl, ServiceStatus};
use crate::source::ScriptSource;
use crate::target::SchedulerTarget;
use crate::{install, job};
use drydock_core::config::DrydockConfig;
use drydock_core::types::{InstallOutcome, JobReport};

/// How often and how long to poll after asking the service manager to start
/// the Agent.
const START_POLL_INTERVAL: Duration = Duration::from_millis(500);
const START_POLL_ATTEMPTS: u32 = 20;

/// One declared job's result within a run.
#[derive(Debug)]
pub struct JobEntry {
    pub name: String,
    pub result: Result<JobReport>,
}

/// Outcome of a full convergence pass.
#[derive(Debug)]
pub struct RunReport {
    pub install: InstallOutcome,
    pub jobs: Vec<JobEntry>,
}

impl RunReport {
    pub fn failed_jobs(&self) -> usize {
        self.jobs.iter().filter(|entry| entry.result.is_err()).count()
    }

    /// Whether every declared job converged.
    pub fn ok(&self) -> bool {
        self.failed_jobs() == 0
    }
}

/// Run one convergence pass.
///
/// Fatal conditions (service missing/unstartable, unreadable script, broken
/// version marker, script execution failure) abort the pass. A failure
/// scoped to one declared job — including a job that does not exist on the
/// target — is recorded in the report and the pass moves on to the next
/// job.
pub async fn run(
    target: &dyn SchedulerTarget,
    services: &dyn ServiceControl,
    source: &dyn ScriptSource,
    config: &DrydockConfig,
) -> Result<RunReport> {
    let service = config.target.agent_service_name();
    ensure_agent_running(services, &service).await?;

    let lines = source
        .read_lines()
        .map_err(|e| EngineError::ScriptUnreadable(format!("{}: {e}", source.describe())))?;
    let install = install::converge_routines(target, &lines).await?;

    let today = chrono::Local::now().date_naive();
    let mut jobs = Vec::with_capacity(config.jobs.len());
    for spec in &config.jobs {
        let result = job::reconcile(target, spec, today).await;
        if let Err(e) = &result {
            warn!(job = %spec.name, error = %e, "job reconciliation failed — continuing");
        }
        jobs.push(JobEntry {
            name: spec.name.clone(),
            result,
        });
    }

    let report = RunReport { install, jobs };
    info!(
        install = %report.install,
        jobs = report.jobs.len(),
        failed = report.failed_jobs(),
        "convergence pass finished"
    );
    Ok(report)
}

/// Guarantee the Agent service is running before any job mutation.
async fn ensure_agent_running(services: &dyn ServiceControl, service: &str) -> Result<()> {
    match services.status(service).await? {
        ServiceStatus::Running => return Ok(()),
        ServiceStatus::Missing => {
            return Err(EngineError::AgentServiceMissing {
                service: service.to_string(),
            });
        }
        state => {
            info!(%service, %state, "Agent service not running — starting it");
        }
    }

    services.set_automatic_start(service).await?;
    services.start(service).await?;

    // Service managers report start-pending for a while; give it a bounded
    // window to come up.
    let mut state = services.status(service).await?;
    for _ in 0..START_POLL_ATTEMPTS {
        if state == ServiceStatus::Running {
            info!(%service, "Agent service started");
            return Ok(());
        }
        tokio::time::sleep(START_POLL_INTERVAL).await;
        state = services.status(service).await?;
    }

    if state == ServiceStatus::Running {
        info!(%service, "Agent service started");
        return Ok(());
    }
    Err(EngineError::AgentServiceNotRunning {
        service: service.to_string(),
        state: state.to_string(),
    })
}
