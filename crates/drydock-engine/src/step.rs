//! Step patching: append a declared parameter fragment to the primary
//! maintenance step's command text, once.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::target::SchedulerTarget;
use drydock_core::types::{LiveJob, StepOutcome};

/// Separator placed between the existing command text and the fragment.
pub const FRAGMENT_SEPARATOR: &str = ",\n";

/// Append `fragment` to the command text of the step named after the job.
///
/// The primary maintenance step shares the job's name by convention, so
/// exactly one step is expected to match; anything else leaves the job
/// untouched. Idempotence rests solely on the containment check — a
/// previously applied fragment that was since reordered or re-spaced would
/// be appended again.
pub async fn patch(
    target: &dyn SchedulerTarget,
    job: &LiveJob,
    fragment: &str,
) -> Result<StepOutcome> {
    let steps = target.job_steps(job).await?;
    let named: Vec<_> = steps.iter().filter(|step| step.name == job.name).collect();

    if named.len() != 1 {
        warn!(
            job = %job.name,
            matched = named.len(),
            "expected exactly one step named after the job — skipping step patch"
        );
        return Ok(StepOutcome::StepNotFound);
    }
    let step = named[0];

    if step.command.contains(fragment) {
        debug!(job = %job.name, step = step.id, "fragment already present");
        return Ok(StepOutcome::Unchanged);
    }

    let command = format!("{}{}{}", step.command, FRAGMENT_SEPARATOR, fragment);
    target.set_step_command(job, step, &command).await?;
    info!(job = %job.name, step = step.id, "fragment appended to step command");
    Ok(StepOutcome::Appended)
}
