//! Schedule reconciliation: create-vs-alter of the managed schedule and the
//! deterministic computation of its full field set.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::target::{ScheduleOp, SchedulerTarget};
use drydock_core::config::{Frequency, ScheduleSpec};
use drydock_core::types::{
    LiveJob, SchedulePlan, ScheduleOutcome, MAX_ACTIVE_END_DATE, SUBDAY_ONCE,
};

/// Managed schedules are named `"{Frequency}-{job name}"`, so each job owns
/// at most one schedule per frequency type.
pub fn schedule_name(frequency: Frequency, job_name: &str) -> String {
    format!("{}-{}", frequency.label(), job_name)
}

/// Compute the full field set for the managed schedule.
///
/// Everything except the start date is a pure function of the spec: the
/// recurrence factor is pinned to 1, the job fires once per day at the
/// declared time, and the active window never ends. The start date is the
/// run date, which keeps the window "from now on" on every pass.
pub fn build_plan(job_name: &str, spec: &ScheduleSpec, today: NaiveDate) -> SchedulePlan {
    let interval = match spec.frequency {
        Frequency::Daily => 1,
        Frequency::Weekly => spec.day_mask(),
    };
    SchedulePlan {
        name: schedule_name(spec.frequency, job_name),
        freq_type: spec.frequency.freq_type(),
        freq_interval: interval,
        freq_subday_type: SUBDAY_ONCE,
        freq_recurrence_factor: 1,
        active_start_date: encode_date(today),
        active_end_date: MAX_ACTIVE_END_DATE,
        active_start_time: encode_time(spec.time),
        enabled: true,
    }
}

/// Converge the managed schedule of `job` to `spec`.
///
/// Present and already converged → no write. Present otherwise → altered in
/// place (never delete-then-recreate). Absent → created. Every write is
/// verified by a re-query; a failed verification is logged and reported but
/// does not abort the run.
pub async fn reconcile(
    target: &dyn SchedulerTarget,
    job: &LiveJob,
    spec: &ScheduleSpec,
    today: NaiveDate,
) -> Result<ScheduleOutcome> {
    let plan = build_plan(&job.name, spec, today);
    let existing = target.find_schedule(job, &plan.name).await?;

    let outcome = match existing {
        Some(live) if plan.matches_live(&live) => {
            debug!(job = %job.name, schedule = %plan.name, "schedule already converged");
            return Ok(ScheduleOutcome::Unchanged);
        }
        Some(live) => {
            target
                .apply_schedule(job, &plan, ScheduleOp::Alter { schedule_id: live.id })
                .await?;
            ScheduleOutcome::Altered
        }
        None => {
            target.apply_schedule(job, &plan, ScheduleOp::Create).await?;
            ScheduleOutcome::Created
        }
    };

    if target.find_schedule(job, &plan.name).await?.is_none() {
        warn!(
            job = %job.name,
            schedule = %plan.name,
            "schedule not found after write"
        );
        return Ok(ScheduleOutcome::VerifyFailed);
    }

    info!(job = %job.name, schedule = %plan.name, outcome = %outcome, "schedule converged");
    Ok(outcome)
}

fn encode_date(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

fn encode_time(time: NaiveTime) -> i32 {
    time.hour() as i32 * 10_000 + time.minute() as i32 * 100 + time.second() as i32
}
