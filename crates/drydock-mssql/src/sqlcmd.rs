//! `sqlcmd` subprocess executor.
//!
//! Each call is one `sqlcmd` invocation: queries are wrapped in
//! `SET NOCOUNT ON` and parsed from the tool's tabular output; scripts run
//! through `-i` so `GO` batches work, with `-b` turning the first failing
//! batch into a non-zero exit.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::executor::{SqlExecutor, Table};
use crate::proc;
use drydock_core::config::{AuthMode, TargetConfig};
use drydock_engine::target::TargetError;

/// Column separator for tabular output. Free-text columns never appear
/// unencoded in result sets (see the hex protocol), so a pipe is safe for
/// the identifier-and-number columns that remain.
const COLUMN_SEPARATOR: char = '|';

pub struct SqlcmdExecutor {
    sqlcmd_path: String,
    server_arg: String,
    database: String,
    auth: AuthArgs,
    timeout: Duration,
}

enum AuthArgs {
    Trusted,
    SqlLogin { username: String, password: String },
}

impl SqlcmdExecutor {
    pub fn new(target: &TargetConfig) -> Self {
        let auth = match target.auth.mode {
            AuthMode::Trusted => AuthArgs::Trusted,
            AuthMode::SqlLogin => AuthArgs::SqlLogin {
                // Presence is enforced by config validation.
                username: target.auth.username.clone().unwrap_or_default(),
                password: target.auth.password.clone().unwrap_or_default(),
            },
        };
        Self {
            sqlcmd_path: "sqlcmd".to_string(),
            server_arg: target.server_arg(),
            database: target.database.clone(),
            auth,
            timeout: Duration::from_secs(target.command_timeout_secs),
        }
    }

    /// Arguments common to every invocation.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.server_arg.clone(),
            "-d".to_string(),
            self.database.clone(),
            // Abort the batch and exit non-zero on the first error.
            "-b".to_string(),
            // Unlimited width for variable-length columns (hex payloads).
            "-y".to_string(),
            "0".to_string(),
            "-W".to_string(),
            "-s".to_string(),
            COLUMN_SEPARATOR.to_string(),
        ];
        match &self.auth {
            AuthArgs::Trusted => args.push("-E".to_string()),
            AuthArgs::SqlLogin { username, password } => {
                args.push("-U".to_string());
                args.push(username.clone());
                args.push("-P".to_string());
                args.push(password.clone());
            }
        }
        args
    }

    async fn run(&self, extra: Vec<String>) -> Result<std::process::Output, TargetError> {
        let mut args = self.base_args();
        args.extend(extra);
        proc::run_with_timeout(&self.sqlcmd_path, &args, self.timeout).await
    }
}

#[async_trait]
impl SqlExecutor for SqlcmdExecutor {
    async fn query(&self, sql: &str) -> Result<Table, TargetError> {
        debug!(server = %self.server_arg, "query: {sql}");
        let output = self
            .run(vec!["-Q".to_string(), format!("SET NOCOUNT ON; {sql}")])
            .await?;
        if !output.status.success() {
            return Err(TargetError::Query(proc::failure_detail(&output)));
        }
        parse_table(&String::from_utf8_lossy(&output.stdout), COLUMN_SEPARATOR)
    }

    async fn execute(&self, sql: &str) -> Result<(), TargetError> {
        debug!(server = %self.server_arg, "execute: {sql}");
        let output = self
            .run(vec!["-Q".to_string(), format!("SET NOCOUNT ON; {sql}")])
            .await?;
        if !output.status.success() {
            return Err(TargetError::Execute(proc::failure_detail(&output)));
        }
        Ok(())
    }

    async fn run_file(&self, path: &Path) -> Result<(), TargetError> {
        debug!(server = %self.server_arg, script = %path.display(), "running script file");
        let output = self
            .run(vec!["-i".to_string(), path.display().to_string()])
            .await?;
        if !output.status.success() {
            return Err(TargetError::Execute(proc::failure_detail(&output)));
        }
        Ok(())
    }
}

/// Parse sqlcmd tabular output: a header line, a dashed underline, then one
/// line per row. `-W` has already trimmed cell padding.
fn parse_table(stdout: &str, separator: char) -> Result<Table, TargetError> {
    let mut lines = stdout.lines().filter(|line| !line.trim().is_empty());

    let Some(header) = lines.next() else {
        // Statements without a result set produce no output at all.
        return Ok(Table::default());
    };
    let columns: Vec<String> = header
        .split(separator)
        .map(|c| c.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for line in lines {
        // The underline between header and data.
        if line.chars().all(|c| c == '-' || c == separator) {
            continue;
        }
        // Row-count trailer, present when NOCOUNT did not apply.
        if line.starts_with('(') && line.trim_end().ends_with("rows affected)") {
            continue;
        }
        let cells: Vec<String> = line.split(separator).map(|c| c.trim().to_string()).collect();
        if cells.len() != columns.len() {
            return Err(TargetError::Decode(format!(
                "row has {} cells, expected {}: `{line}`",
                cells.len(),
                columns.len()
            )));
        }
        rows.push(cells);
    }

    Ok(Table::new(columns, rows))
}
