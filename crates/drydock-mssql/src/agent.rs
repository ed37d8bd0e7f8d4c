//! Typed msdb Agent client: implements the engine's [`SchedulerTarget`]
//! over any [`SqlExecutor`].

use async_trait::async_trait;
use std::path::Path;

use tracing::debug;

use crate::executor::{SqlExecutor, Table};
use drydock_core::types::{LiveJob, LiveSchedule, LiveStep, RoutineMeta, SchedulePlan};
use drydock_engine::target::{ScheduleOp, SchedulerTarget, TargetError};
use drydock_engine::version::{VERSION_MARKER, VERSION_TOKEN_LEN};

pub struct AgentClient<E: SqlExecutor> {
    sql: E,
}

impl<E: SqlExecutor> AgentClient<E> {
    pub fn new(sql: E) -> Self {
        Self { sql }
    }
}

/// N'…' literal with embedded quotes doubled.
fn quote(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

fn at_most_one(table: &Table, what: &str) -> Result<(), TargetError> {
    if table.len() > 1 {
        return Err(TargetError::Decode(format!(
            "{} rows for {what}, expected at most one",
            table.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl<E: SqlExecutor> SchedulerTarget for AgentClient<E> {
    async fn find_job(&self, name: &str) -> Result<Option<LiveJob>, TargetError> {
        let sql = format!(
            "SELECT CONVERT(VARCHAR(36), job_id) AS job_id, name, enabled \
             FROM msdb.dbo.sysjobs WHERE name = {}",
            quote(name)
        );
        let table = self.sql.query(&sql).await?;
        at_most_one(&table, &format!("job `{name}`"))?;
        let Some(row) = table.rows().next() else {
            return Ok(None);
        };
        Ok(Some(LiveJob {
            id: row.get_str("job_id")?.to_string(),
            name: row.get_str("name")?.to_string(),
            enabled: row.get_bool("enabled")?,
        }))
    }

    async fn set_job_enabled(&self, job: &LiveJob, enabled: bool) -> Result<(), TargetError> {
        let sql = format!(
            "EXEC msdb.dbo.sp_update_job @job_name = {}, @enabled = {}",
            quote(&job.name),
            i32::from(enabled)
        );
        self.sql.execute(&sql).await
    }

    async fn find_schedule(
        &self,
        job: &LiveJob,
        name: &str,
    ) -> Result<Option<LiveSchedule>, TargetError> {
        let sql = format!(
            "SELECT s.schedule_id, s.enabled, s.freq_type, s.freq_interval, \
                    s.freq_subday_type, s.freq_recurrence_factor, \
                    s.active_start_time, s.active_end_date \
             FROM msdb.dbo.sysschedules s \
             JOIN msdb.dbo.sysjobschedules js ON js.schedule_id = s.schedule_id \
             WHERE js.job_id = CONVERT(UNIQUEIDENTIFIER, {}) AND s.name = {}",
            quote(&job.id),
            quote(name)
        );
        let table = self.sql.query(&sql).await?;
        at_most_one(&table, &format!("schedule `{name}`"))?;
        let Some(row) = table.rows().next() else {
            return Ok(None);
        };
        Ok(Some(LiveSchedule {
            id: row.get_i32("schedule_id")?,
            name: name.to_string(),
            enabled: row.get_bool("enabled")?,
            freq_type: row.get_i32("freq_type")?,
            freq_interval: row.get_i32("freq_interval")?,
            freq_subday_type: row.get_i32("freq_subday_type")?,
            freq_recurrence_factor: row.get_i32("freq_recurrence_factor")?,
            active_start_time: row.get_i32("active_start_time")?,
            active_end_date: row.get_i32("active_end_date")?,
        }))
    }

    async fn apply_schedule(
        &self,
        job: &LiveJob,
        plan: &SchedulePlan,
        op: ScheduleOp,
    ) -> Result<(), TargetError> {
        let recurrence = format!(
            "@enabled = {}, @freq_type = {}, @freq_interval = {}, \
             @freq_subday_type = {}, @freq_recurrence_factor = {}, \
             @active_start_date = {}, @active_end_date = {}, @active_start_time = {}",
            i32::from(plan.enabled),
            plan.freq_type,
            plan.freq_interval,
            plan.freq_subday_type,
            plan.freq_recurrence_factor,
            plan.active_start_date,
            plan.active_end_date,
            plan.active_start_time
        );
        let sql = match op {
            ScheduleOp::Create => format!(
                "EXEC msdb.dbo.sp_add_jobschedule @job_name = {}, @name = {}, {recurrence}",
                quote(&job.name),
                quote(&plan.name)
            ),
            ScheduleOp::Alter { schedule_id } => format!(
                "EXEC msdb.dbo.sp_update_schedule @schedule_id = {schedule_id}, {recurrence}"
            ),
        };
        debug!(job = %job.name, schedule = %plan.name, ?op, "writing schedule");
        self.sql.execute(&sql).await
    }

    async fn job_steps(&self, job: &LiveJob) -> Result<Vec<LiveStep>, TargetError> {
        // Command text can contain anything, including the column separator
        // and newlines, so it travels hex-encoded.
        let sql = format!(
            "SELECT step_id, step_name, \
                    CONVERT(VARCHAR(MAX), CAST(command AS VARBINARY(MAX)), 1) AS command_hex \
             FROM msdb.dbo.sysjobsteps \
             WHERE job_id = CONVERT(UNIQUEIDENTIFIER, {}) ORDER BY step_id",
            quote(&job.id)
        );
        let table = self.sql.query(&sql).await?;
        table
            .rows()
            .map(|row| {
                Ok(LiveStep {
                    id: row.get_i32("step_id")?,
                    name: row.get_str("step_name")?.to_string(),
                    command: row.get_hex_text("command_hex")?,
                })
            })
            .collect()
    }

    async fn set_step_command(
        &self,
        job: &LiveJob,
        step: &LiveStep,
        command: &str,
    ) -> Result<(), TargetError> {
        let sql = format!(
            "EXEC msdb.dbo.sp_update_jobstep @job_name = {}, @step_id = {}, @command = {}",
            quote(&job.name),
            step.id,
            quote(command)
        );
        self.sql.execute(&sql).await
    }

    async fn routine_inventory(&self, names: &[&str]) -> Result<Vec<RoutineMeta>, TargetError> {
        let name_list = names
            .iter()
            .map(|name| quote(name))
            .collect::<Vec<_>>()
            .join(", ");
        // The token is cut out server-side so the result stays one line per
        // routine; a definition without the marker yields NULL.
        let sql = format!(
            "SELECT o.name, CHECKSUM(m.definition) AS checksum, \
                    CASE WHEN CHARINDEX({marker}, m.definition) = 0 THEN NULL \
                         ELSE SUBSTRING(m.definition, \
                                        CHARINDEX({marker}, m.definition) + {offset}, {len}) \
                    END AS version_token \
             FROM sys.objects o \
             JOIN sys.sql_modules m ON m.object_id = o.object_id \
             WHERE o.name IN ({name_list})",
            marker = quote(VERSION_MARKER),
            offset = VERSION_MARKER.len(),
            len = VERSION_TOKEN_LEN
        );
        let table = self.sql.query(&sql).await?;
        table
            .rows()
            .map(|row| {
                Ok(RoutineMeta {
                    name: row.get_str("name")?.to_string(),
                    checksum: row.get_i64("checksum")?,
                    version_token: row.get_opt_str("version_token")?.map(str::to_string),
                })
            })
            .collect()
    }

    async fn run_script(&self, path: &Path) -> Result<(), TargetError> {
        self.sql.run_file(path).await
    }
}
