//! End-to-end convergence passes against in-memory fakes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use drydock_core::config::{
    AuthConfig, DayOfWeek, DrydockConfig, Frequency, InstallConfig, JobSpec, LogConfig,
    ScheduleSpec, TargetConfig,
};
use drydock_core::types::{
    InstallOutcome, LiveJob, LiveSchedule, LiveStep, RoutineMeta, SchedulePlan, ScheduleOutcome,
    StepOutcome, MAX_ACTIVE_END_DATE,
};
use drydock_engine::runner;
use drydock_engine::service::{ServiceControl, ServiceStatus};
use drydock_engine::source::ScriptSource;
use drydock_engine::target::{ScheduleOp, SchedulerTarget, TargetError};
use drydock_engine::EngineError;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    jobs: Vec<LiveJob>,
    /// Keyed by (job id, schedule name).
    schedules: HashMap<(String, String), LiveSchedule>,
    /// Keyed by job id.
    steps: HashMap<String, Vec<LiveStep>>,
    routines: Vec<RoutineMeta>,
    next_schedule_id: i32,

    // Recorded mutations.
    enabled_writes: Vec<(String, bool)>,
    schedule_ops: Vec<(String, ScheduleOp)>,
    scripts_run: Vec<String>,

    /// Simulate a write that the re-query cannot see.
    swallow_schedule_writes: bool,
}

#[derive(Default)]
struct FakeTarget {
    state: Mutex<FakeState>,
}

impl FakeTarget {
    fn with_state(state: FakeState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

fn live_schedule_from_plan(id: i32, plan: &SchedulePlan) -> LiveSchedule {
    LiveSchedule {
        id,
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

#[async_trait]
impl SchedulerTarget for FakeTarget {
    async fn find_job(&self, name: &str) -> Result<Option<LiveJob>, TargetError> {
        Ok(self.state().jobs.iter().find(|j| j.name == name).cloned())
    }

    async fn set_job_enabled(&self, job: &LiveJob, enabled: bool) -> Result<(), TargetError> {
        let mut state = self.state();
        state.enabled_writes.push((job.name.clone(), enabled));
        if let Some(live) = state.jobs.iter_mut().find(|j| j.id == job.id) {
            live.enabled = enabled;
        }
        Ok(())
    }

    async fn find_schedule(
        &self,
        job: &LiveJob,
        name: &str,
    ) -> Result<Option<LiveSchedule>, TargetError> {
        Ok(self
            .state()
            .schedules
            .get(&(job.id.clone(), name.to_string()))
            .cloned())
    }

    async fn apply_schedule(
        &self,
        job: &LiveJob,
        plan: &SchedulePlan,
        op: ScheduleOp,
    ) -> Result<(), TargetError> {
        let mut state = self.state();
        state.schedule_ops.push((plan.name.clone(), op));
        if state.swallow_schedule_writes {
            return Ok(());
        }
        let id = match op {
            ScheduleOp::Create => {
                state.next_schedule_id += 1;
                state.next_schedule_id
            }
            ScheduleOp::Alter { schedule_id } => schedule_id,
        };
        state.schedules.insert(
            (job.id.clone(), plan.name.clone()),
            live_schedule_from_plan(id, plan),
        );
        Ok(())
    }

    async fn job_steps(&self, job: &LiveJob) -> Result<Vec<LiveStep>, TargetError> {
        Ok(self.state().steps.get(&job.id).cloned().unwrap_or_default())
    }

    async fn set_step_command(
        &self,
        job: &LiveJob,
        step: &LiveStep,
        command: &str,
    ) -> Result<(), TargetError> {
        let mut state = self.state();
        let steps = state
            .steps
            .get_mut(&job.id)
            .ok_or_else(|| TargetError::Decode("no such job".to_string()))?;
        let live = steps
            .iter_mut()
            .find(|s| s.id == step.id)
            .ok_or_else(|| TargetError::Decode("no such step".to_string()))?;
        live.command = command.to_string();
        Ok(())
    }

    async fn routine_inventory(&self, names: &[&str]) -> Result<Vec<RoutineMeta>, TargetError> {
        Ok(self
            .state()
            .routines
            .iter()
            .filter(|r| names.contains(&r.name.as_str()))
            .cloned()
            .collect())
    }

    async fn run_script(&self, path: &Path) -> Result<(), TargetError> {
        // Capture the staged script so tests can assert on the exact text.
        let text = std::fs::read_to_string(path)
            .map_err(|e| TargetError::Execute(e.to_string()))?;
        self.state().scripts_run.push(text);
        Ok(())
    }
}

struct FakeService {
    status: Mutex<ServiceStatus>,
    set_automatic_calls: Mutex<u32>,
    start_calls: Mutex<u32>,
}

impl FakeService {
    fn with_status(status: ServiceStatus) -> Self {
        Self {
            status: Mutex::new(status),
            set_automatic_calls: Mutex::new(0),
            start_calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ServiceControl for FakeService {
    async fn status(&self, _service: &str) -> Result<ServiceStatus, TargetError> {
        Ok(self.status.lock().unwrap().clone())
    }

    async fn set_automatic_start(&self, _service: &str) -> Result<(), TargetError> {
        *self.set_automatic_calls.lock().unwrap() += 1;
        Ok(())
    }

    async fn start(&self, _service: &str) -> Result<(), TargetError> {
        *self.start_calls.lock().unwrap() += 1;
        *self.status.lock().unwrap() = ServiceStatus::Running;
        Ok(())
    }
}

struct StaticSource(Vec<String>);

impl StaticSource {
    fn new(script: &str) -> Self {
        Self(script.lines().map(str::to_string).collect())
    }
}

impl ScriptSource for StaticSource {
    fn read_lines(&self) -> std::io::Result<Vec<String>> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static script".to_string()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const SCRIPT: &str = "\
--// Version: 2023-01-29 18:52:10
DECLARE @CreateJobs nvarchar(max)
SET @CreateJobs = 'Y'
PRINT 'installing'
GO";

fn config_with_jobs(jobs: Vec<JobSpec>) -> DrydockConfig {
    DrydockConfig {
        target: TargetConfig {
            server: "db01".to_string(),
            instance: None,
            database: "master".to_string(),
            auth: AuthConfig::default(),
            command_timeout_secs: 300,
        },
        install: InstallConfig {
            script_path: "MaintenanceSolution.sql".to_string(),
        },
        log: LogConfig::default(),
        jobs,
    }
}

fn job_spec(name: &str) -> JobSpec {
    JobSpec {
        name: name.to_string(),
        enabled: true,
        schedule: None,
        step_append: None,
    }
}

fn index_optimize_spec() -> JobSpec {
    JobSpec {
        name: "IndexOptimize - USER_DATABASES".to_string(),
        enabled: true,
        schedule: Some(ScheduleSpec {
            frequency: Frequency::Weekly,
            days: vec![DayOfWeek::Sunday],
            time: "00:30:00".parse().unwrap(),
        }),
        step_append: Some("@UpdateStatistics = 'ALL'".to_string()),
    }
}

fn live_job(id: &str, name: &str) -> LiveJob {
    LiveJob {
        id: id.to_string(),
        name: name.to_string(),
        enabled: false,
    }
}

fn routine(name: &str, checksum: i64, token: &str) -> RoutineMeta {
    RoutineMeta {
        name: name.to_string(),
        checksum,
        version_token: Some(token.to_string()),
    }
}

fn current_routines() -> Vec<RoutineMeta> {
    vec![
        routine("CommandExecute", 1, "2023-01-29 18:52:10"),
        routine("DatabaseBackup", 2, "2023-01-29 18:52:10"),
        routine("DatabaseIntegrityCheck", 3, "2023-01-29 18:52:10"),
        routine("IndexOptimize", 4, "2023-01-29 18:52:10"),
    ]
}

fn older_routines() -> Vec<RoutineMeta> {
    vec![
        routine("CommandExecute", 1, "2022-12-03 17:23:44"),
        routine("DatabaseBackup", 2, "2022-12-03 17:23:44"),
        routine("DatabaseIntegrityCheck", 3, "2022-12-03 17:23:44"),
        routine("IndexOptimize", 4, "2022-12-03 17:23:44"),
    ]
}

// ---------------------------------------------------------------------------
// Install gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_install_runs_script_verbatim() {
    let target = FakeTarget::default();
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert_eq!(report.install, InstallOutcome::Installed);
    let state = target.state();
    assert_eq!(state.scripts_run.len(), 1);
    // Fresh install leaves the job-creation flag alone.
    assert!(state.scripts_run[0].contains("SET @CreateJobs = 'Y'"));
}

#[tokio::test]
async fn upgrade_flips_flag_and_leaves_rest_untouched() {
    let target = FakeTarget::with_state(FakeState {
        routines: older_routines(),
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert_eq!(report.install, InstallOutcome::Upgraded);
    let state = target.state();
    let executed = &state.scripts_run[0];
    assert!(executed.contains("SET @CreateJobs = 'N'"));
    assert!(!executed.contains("SET @CreateJobs = 'Y'"));
    // Everything except the flag line is byte-identical.
    for (original, patched) in SCRIPT.lines().zip(executed.lines()) {
        if !original.contains("@CreateJobs") {
            assert_eq!(original, patched);
        }
    }
}

#[tokio::test]
async fn equal_versions_run_no_script() {
    let target = FakeTarget::with_state(FakeState {
        routines: current_routines(),
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert_eq!(report.install, InstallOutcome::UpToDate);
    assert!(target.state().scripts_run.is_empty());
}

#[tokio::test]
async fn newer_deployment_is_advisory_only() {
    let mut routines = current_routines();
    for routine in &mut routines {
        routine.version_token = Some("2024-06-01 09:00:00".to_string());
    }
    let target = FakeTarget::with_state(FakeState {
        routines,
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert_eq!(report.install, InstallOutcome::SourceOutdated);
    assert!(target.state().scripts_run.is_empty());
}

#[tokio::test]
async fn drifted_deployment_is_reinstalled_preserving_jobs() {
    let mut routines = current_routines();
    routines[2].version_token = Some("2022-12-03 17:23:44".to_string());
    let target = FakeTarget::with_state(FakeState {
        routines,
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert_eq!(report.install, InstallOutcome::Upgraded);
    assert!(target.state().scripts_run[0].contains("SET @CreateJobs = 'N'"));
}

// ---------------------------------------------------------------------------
// Job reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn index_optimize_scenario_creates_schedule_and_appends_fragment() {
    let job = live_job("J-1", "IndexOptimize - USER_DATABASES");
    let original_command = "EXECUTE [dbo].[IndexOptimize]\n@Databases = 'USER_DATABASES'";
    let mut state = FakeState {
        routines: current_routines(),
        jobs: vec![job.clone()],
        ..FakeState::default()
    };
    state.steps.insert(
        job.id.clone(),
        vec![LiveStep {
            id: 1,
            name: job.name.clone(),
            command: original_command.to_string(),
        }],
    );
    let target = FakeTarget::with_state(state);
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![index_optimize_spec()]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert!(report.ok());
    let entry = &report.jobs[0];
    let job_report = entry.result.as_ref().unwrap();
    assert_eq!(job_report.schedule, Some(ScheduleOutcome::Created));
    assert_eq!(job_report.step, Some(StepOutcome::Appended));

    let state = target.state();
    assert_eq!(
        state.enabled_writes,
        vec![("IndexOptimize - USER_DATABASES".to_string(), true)]
    );

    let schedule = state
        .schedules
        .get(&(
            "J-1".to_string(),
            "Weekly-IndexOptimize - USER_DATABASES".to_string(),
        ))
        .expect("schedule exists under the synthesized name");
    assert_eq!(schedule.freq_type, 8);
    assert_eq!(schedule.freq_interval, 1);
    assert_eq!(schedule.active_start_time, 3000);
    assert_eq!(schedule.active_end_date, MAX_ACTIVE_END_DATE);
    assert!(schedule.enabled);

    let step = &state.steps["J-1"][0];
    assert_eq!(
        step.command,
        format!("{original_command},\n@UpdateStatistics = 'ALL'")
    );
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let job = live_job("J-1", "IndexOptimize - USER_DATABASES");
    let mut state = FakeState {
        routines: current_routines(),
        jobs: vec![job.clone()],
        ..FakeState::default()
    };
    state.steps.insert(
        job.id.clone(),
        vec![LiveStep {
            id: 1,
            name: job.name.clone(),
            command: "EXECUTE [dbo].[IndexOptimize]".to_string(),
        }],
    );
    let target = FakeTarget::with_state(state);
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![index_optimize_spec()]);

    let first = runner::run(&target, &service, &source, &config).await.unwrap();
    let second = runner::run(&target, &service, &source, &config).await.unwrap();

    let first_report = first.jobs[0].result.as_ref().unwrap();
    assert_eq!(first_report.schedule, Some(ScheduleOutcome::Created));
    assert_eq!(first_report.step, Some(StepOutcome::Appended));

    let second_report = second.jobs[0].result.as_ref().unwrap();
    assert_eq!(second_report.schedule, Some(ScheduleOutcome::Unchanged));
    assert_eq!(second_report.step, Some(StepOutcome::Unchanged));

    let state = target.state();
    // One create, no alter: the second pass saw a converged schedule.
    assert_eq!(state.schedule_ops.len(), 1);
    assert!(matches!(state.schedule_ops[0].1, ScheduleOp::Create));
    // The fragment appears exactly once.
    let command = &state.steps["J-1"][0].command;
    assert_eq!(command.matches("@UpdateStatistics = 'ALL'").count(), 1);
}

#[tokio::test]
async fn changed_schedule_is_altered_in_place() {
    let job = live_job("J-1", "IndexOptimize - USER_DATABASES");
    let mut state = FakeState {
        routines: current_routines(),
        jobs: vec![job.clone()],
        ..FakeState::default()
    };
    // Existing schedule under the managed name, but firing on Saturday.
    state.schedules.insert(
        (job.id.clone(), "Weekly-IndexOptimize - USER_DATABASES".to_string()),
        LiveSchedule {
            id: 42,
            name: "Weekly-IndexOptimize - USER_DATABASES".to_string(),
            enabled: true,
            freq_type: 8,
            freq_interval: 64,
            freq_subday_type: 1,
            freq_recurrence_factor: 1,
            active_start_time: 3000,
            active_end_date: MAX_ACTIVE_END_DATE,
        },
    );
    let target = FakeTarget::with_state(state);
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let mut spec = index_optimize_spec();
    spec.step_append = None;
    let config = config_with_jobs(vec![spec]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    let job_report = report.jobs[0].result.as_ref().unwrap();
    assert_eq!(job_report.schedule, Some(ScheduleOutcome::Altered));

    let state = target.state();
    assert_eq!(state.schedule_ops.len(), 1);
    assert_eq!(
        state.schedule_ops[0].1,
        ScheduleOp::Alter { schedule_id: 42 }
    );
    // Altered in place: same id, new interval.
    let schedule = &state.schedules
        [&("J-1".to_string(), "Weekly-IndexOptimize - USER_DATABASES".to_string())];
    assert_eq!(schedule.id, 42);
    assert_eq!(schedule.freq_interval, 1);
}

#[tokio::test]
async fn missing_job_is_skipped_and_the_run_continues() {
    let existing = live_job("J-2", "CommandLog Cleanup");
    let target = FakeTarget::with_state(FakeState {
        routines: current_routines(),
        jobs: vec![existing],
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![
        job_spec("No Such Job"),
        job_spec("CommandLog Cleanup"),
    ]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert!(!report.ok());
    assert_eq!(report.failed_jobs(), 1);
    assert!(matches!(
        report.jobs[0].result,
        Err(EngineError::JobNotFound { .. })
    ));
    // The later job was still reconciled.
    assert!(report.jobs[1].result.is_ok());
    assert_eq!(
        target.state().enabled_writes,
        vec![("CommandLog Cleanup".to_string(), true)]
    );
}

#[tokio::test]
async fn disabled_spec_disables_the_job() {
    let job = live_job("J-3", "Output File Cleanup");
    let target = FakeTarget::with_state(FakeState {
        routines: current_routines(),
        jobs: vec![job],
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let mut spec = job_spec("Output File Cleanup");
    spec.enabled = false;
    let config = config_with_jobs(vec![spec]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert!(report.ok());
    let state = target.state();
    assert_eq!(
        state.enabled_writes,
        vec![("Output File Cleanup".to_string(), false)]
    );
    assert!(!state.jobs[0].enabled);
}

#[tokio::test]
async fn schedule_verify_failure_is_recoverable() {
    let job = live_job("J-1", "IndexOptimize - USER_DATABASES");
    let target = FakeTarget::with_state(FakeState {
        routines: current_routines(),
        jobs: vec![job],
        swallow_schedule_writes: true,
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let mut spec = index_optimize_spec();
    spec.step_append = None;
    let config = config_with_jobs(vec![spec]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    // Verification failure is a warning, not a job failure.
    assert!(report.ok());
    let job_report = report.jobs[0].result.as_ref().unwrap();
    assert_eq!(job_report.schedule, Some(ScheduleOutcome::VerifyFailed));
}

#[tokio::test]
async fn ambiguous_step_lookup_mutates_nothing() {
    let job = live_job("J-1", "IndexOptimize - USER_DATABASES");
    let mut state = FakeState {
        routines: current_routines(),
        jobs: vec![job.clone()],
        ..FakeState::default()
    };
    state.steps.insert(
        job.id.clone(),
        vec![
            LiveStep {
                id: 1,
                name: job.name.clone(),
                command: "one".to_string(),
            },
            LiveStep {
                id: 2,
                name: job.name.clone(),
                command: "two".to_string(),
            },
        ],
    );
    let target = FakeTarget::with_state(state);
    let service = FakeService::with_status(ServiceStatus::Running);
    let source = StaticSource::new(SCRIPT);
    let mut spec = index_optimize_spec();
    spec.schedule = None;
    let config = config_with_jobs(vec![spec]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    let job_report = report.jobs[0].result.as_ref().unwrap();
    assert_eq!(job_report.step, Some(StepOutcome::StepNotFound));
    let state = target.state();
    assert_eq!(state.steps["J-1"][0].command, "one");
    assert_eq!(state.steps["J-1"][1].command, "two");
}

// ---------------------------------------------------------------------------
// Service gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stopped_agent_is_set_automatic_and_started() {
    let target = FakeTarget::with_state(FakeState {
        routines: current_routines(),
        ..FakeState::default()
    });
    let service = FakeService::with_status(ServiceStatus::Stopped);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![]);

    let report = runner::run(&target, &service, &source, &config).await.unwrap();

    assert!(report.ok());
    assert_eq!(*service.set_automatic_calls.lock().unwrap(), 1);
    assert_eq!(*service.start_calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn missing_agent_service_is_fatal() {
    let target = FakeTarget::default();
    let service = FakeService::with_status(ServiceStatus::Missing);
    let source = StaticSource::new(SCRIPT);
    let config = config_with_jobs(vec![job_spec("CommandLog Cleanup")]);

    let err = runner::run(&target, &service, &source, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AgentServiceMissing { .. }));
    // Nothing was touched.
    let state = target.state();
    assert!(state.scripts_run.is_empty());
    assert!(state.enabled_writes.is_empty());
}
