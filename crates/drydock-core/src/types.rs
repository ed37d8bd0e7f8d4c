//! Live scheduler entities and reconciliation outcomes.
//!
//! Live types mirror the Agent's own records one-to-one and exist only for
//! the duration of a single convergence pass; nothing here is persisted.

use serde::Serialize;

/// Agent end-date sentinel: the maximum representable date, yyyymmdd.
pub const MAX_ACTIVE_END_DATE: i32 = 99_99_12_31;
/// Agent freq_subday_type code for "once per day".
pub const SUBDAY_ONCE: i32 = 1;

/// A job as it exists on the target. Identity is the exact name.
#[derive(Debug, Clone)]
pub struct LiveJob {
    /// Server-side job id (uniqueidentifier), used to key sub-entities.
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

/// A schedule attached to a job, with the full recurrence field set so the
/// engine can compare before writing.
#[derive(Debug, Clone)]
pub struct LiveSchedule {
    pub id: i32,
    pub name: String,
    pub enabled: bool,
    pub freq_type: i32,
    pub freq_interval: i32,
    pub freq_subday_type: i32,
    pub freq_recurrence_factor: i32,
    pub active_start_time: i32,
    pub active_end_date: i32,
}

/// One step of a job, with its command text.
#[derive(Debug, Clone)]
pub struct LiveStep {
    pub id: i32,
    pub name: String,
    pub command: String,
}

/// Deployed-routine metadata used by the install gate.
#[derive(Debug, Clone)]
pub struct RoutineMeta {
    pub name: String,
    /// Server-side CHECKSUM of the deployed definition.
    pub checksum: i64,
    /// Version token extracted from the definition, absent when the
    /// definition carries no marker.
    pub version_token: Option<String>,
}

/// The full schedule field set computed deterministically from a declared
/// spec. Applied verbatim on create and on alter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulePlan {
    pub name: String,
    pub freq_type: i32,
    pub freq_interval: i32,
    pub freq_subday_type: i32,
    pub freq_recurrence_factor: i32,
    /// Date of the reconciliation run, yyyymmdd. The only field excluded
    /// from the converged-already comparison.
    pub active_start_date: i32,
    pub active_end_date: i32,
    /// Time-of-day encoded hhmmss.
    pub active_start_time: i32,
    pub enabled: bool,
}

impl SchedulePlan {
    /// Whether `live` already carries every planned field. The start date is
    /// deliberately ignored: it is stamped with the run date on every write
    /// and must not by itself force a rewrite.
    pub fn matches_live(&self, live: &LiveSchedule) -> bool {
        self.enabled == live.enabled
            && self.freq_type == live.freq_type
            && self.freq_interval == live.freq_interval
            && self.freq_subday_type == live.freq_subday_type
            && self.freq_recurrence_factor == live.freq_recurrence_factor
            && self.active_start_time == live.active_start_time
            && self.active_end_date == live.active_end_date
    }
}

/// What the install gate did this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    /// No routines were deployed; full fresh install ran.
    Installed,
    /// Deployed routines were older (or drifted); preserve-jobs upgrade ran.
    Upgraded,
    /// Deployed version equals the script version; nothing ran.
    UpToDate,
    /// Deployed routines are newer than the script; nothing ran, advisory
    /// logged to update the source file.
    SourceOutdated,
}

impl std::fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstallOutcome::Installed => "installed",
            InstallOutcome::Upgraded => "upgraded",
            InstallOutcome::UpToDate => "up to date",
            InstallOutcome::SourceOutdated => "source outdated",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Created,
    Altered,
    /// Every field other than the start date already matched; no write.
    Unchanged,
    /// The write went through but the post-write lookup came back empty.
    VerifyFailed,
}

impl std::fmt::Display for ScheduleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleOutcome::Created => "created",
            ScheduleOutcome::Altered => "altered",
            ScheduleOutcome::Unchanged => "unchanged",
            ScheduleOutcome::VerifyFailed => "verify failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Appended,
    /// Fragment already present in the command text.
    Unchanged,
    /// Zero or more than one step carries the job's name; no mutation.
    StepNotFound,
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepOutcome::Appended => "appended",
            StepOutcome::Unchanged => "unchanged",
            StepOutcome::StepNotFound => "step not found",
        };
        write!(f, "{s}")
    }
}

/// Per-job reconciliation result.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    /// Enabled flag that was applied (always written, even when already set).
    pub enabled: bool,
    /// Absent when the spec declares no managed schedule.
    pub schedule: Option<ScheduleOutcome>,
    /// Absent when the spec declares no step fragment.
    pub step: Option<StepOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(plan: &SchedulePlan) -> LiveSchedule {
        LiveSchedule {
            id: 7,
            name: plan.name.clone(),
            enabled: plan.enabled,
            freq_type: plan.freq_type,
            freq_interval: plan.freq_interval,
            freq_subday_type: plan.freq_subday_type,
            freq_recurrence_factor: plan.freq_recurrence_factor,
            active_start_time: plan.active_start_time,
            active_end_date: plan.active_end_date,
        }
    }

    fn plan() -> SchedulePlan {
        SchedulePlan {
            name: "Weekly-IndexOptimize - USER_DATABASES".to_string(),
            freq_type: 8,
            freq_interval: 1,
            freq_subday_type: SUBDAY_ONCE,
            freq_recurrence_factor: 1,
            active_start_date: 2026_08_06,
            active_end_date: MAX_ACTIVE_END_DATE,
            active_start_time: 3000,
            enabled: true,
        }
    }

    #[test]
    fn matches_ignores_start_date() {
        let p = plan();
        let l = live(&p);
        let mut later = p.clone();
        later.active_start_date = 2026_12_24;
        assert!(later.matches_live(&l));
    }

    #[test]
    fn matches_detects_field_change() {
        let p = plan();
        let mut l = live(&p);
        l.freq_interval = 64;
        assert!(!p.matches_live(&l));

        let mut l = live(&p);
        l.active_start_time = 13_30_00;
        assert!(!p.matches_live(&l));

        let mut l = live(&p);
        l.enabled = false;
        assert!(!p.matches_live(&l));
    }
}
