//! Per-job reconciliation: enabled flag, then schedule, then step.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::target::SchedulerTarget;
use crate::{schedule, step};
use drydock_core::config::JobSpec;
use drydock_core::types::JobReport;

/// Converge one declared job against the live scheduler state.
///
/// The job must already exist; a missing job is this job's failure (the
/// caller decides whether that ends the run). The enabled flag is written
/// unconditionally, not compare-before-write.
pub async fn reconcile(
    target: &dyn SchedulerTarget,
    spec: &JobSpec,
    today: NaiveDate,
) -> Result<JobReport> {
    let job = target
        .find_job(&spec.name)
        .await?
        .ok_or_else(|| EngineError::JobNotFound {
            name: spec.name.clone(),
        })?;

    target.set_job_enabled(&job, spec.enabled).await?;
    debug!(job = %job.name, enabled = spec.enabled, "enabled flag applied");

    let schedule_outcome = match &spec.schedule {
        Some(schedule_spec) => {
            Some(schedule::reconcile(target, &job, schedule_spec, today).await?)
        }
        None => {
            info!(job = %job.name, "no managed schedule declared — schedules left untouched");
            None
        }
    };

    let step_outcome = match &spec.step_append {
        Some(fragment) => Some(step::patch(target, &job, fragment).await?),
        None => None,
    };

    Ok(JobReport {
        name: spec.name.clone(),
        enabled: spec.enabled,
        schedule: schedule_outcome,
        step: step_outcome,
    })
}
