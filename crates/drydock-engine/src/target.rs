//! Capability trait for the job scheduler on the target server.
//!
//! The engine never issues SQL itself; everything it needs from the target
//! goes through [`SchedulerTarget`]. The shipped implementation is
//! `drydock-mssql::AgentClient`; tests substitute in-memory fakes.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use drydock_core::types::{LiveJob, LiveSchedule, LiveStep, RoutineMeta, SchedulePlan};

/// How a schedule write is applied: create a new schedule bound to the job,
/// or alter the existing row in place. Never delete-then-recreate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOp {
    Create,
    Alter { schedule_id: i32 },
}

/// Errors surfaced by a [`SchedulerTarget`] or [`crate::service::ServiceControl`]
/// adapter.
#[derive(Debug, Error)]
pub enum TargetError {
    /// A read-only metadata query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// A mutating command or script execution failed.
    #[error("command failed: {0}")]
    Execute(String),

    /// The adapter could not make sense of a result set.
    #[error("malformed result set: {0}")]
    Decode(String),

    /// The target (or the transport to it) is unreachable.
    #[error("target unavailable: {0}")]
    Unavailable(String),
}

/// Everything the engine needs from the target's job scheduler.
///
/// All calls are synchronous remote round-trips from the engine's point of
/// view: one at a time, awaited to completion. Timeouts are the transport's
/// responsibility.
#[async_trait]
pub trait SchedulerTarget: Send + Sync {
    /// Look up a job by exact name.
    async fn find_job(&self, name: &str) -> Result<Option<LiveJob>, TargetError>;

    /// Write the enabled flag. Called unconditionally, even when the live
    /// value already matches.
    async fn set_job_enabled(&self, job: &LiveJob, enabled: bool) -> Result<(), TargetError>;

    /// Look up a schedule attached to `job` by schedule name.
    async fn find_schedule(
        &self,
        job: &LiveJob,
        name: &str,
    ) -> Result<Option<LiveSchedule>, TargetError>;

    /// Apply the full plan field set via the given operation.
    async fn apply_schedule(
        &self,
        job: &LiveJob,
        plan: &SchedulePlan,
        op: ScheduleOp,
    ) -> Result<(), TargetError>;

    /// All steps of `job`, in step order, with command text.
    async fn job_steps(&self, job: &LiveJob) -> Result<Vec<LiveStep>, TargetError>;

    /// Replace a step's command text.
    async fn set_step_command(
        &self,
        job: &LiveJob,
        step: &LiveStep,
        command: &str,
    ) -> Result<(), TargetError>;

    /// Metadata for the deployed routines out of `names`. Routines that are
    /// not deployed are simply absent from the result.
    async fn routine_inventory(&self, names: &[&str]) -> Result<Vec<RoutineMeta>, TargetError>;

    /// Execute a multi-batch script file against the target, aborting on the
    /// first failing statement.
    async fn run_script(&self, path: &Path) -> Result<(), TargetError>;
}
