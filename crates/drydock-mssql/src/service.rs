//! Windows service controller over `sc.exe`.

use async_trait::async_trait;
use std::time::Duration;

use tracing::debug;

use crate::proc;
use drydock_engine::service::{ServiceControl, ServiceStatus};
use drydock_engine::target::TargetError;

/// Exit code of `sc query` when the service is not installed.
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;

pub struct ScServiceController {
    sc_path: String,
    timeout: Duration,
}

impl ScServiceController {
    pub fn new() -> Self {
        Self {
            sc_path: "sc.exe".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, TargetError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        proc::run_with_timeout(&self.sc_path, &args, self.timeout).await
    }
}

impl Default for ScServiceController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceControl for ScServiceController {
    async fn status(&self, service: &str) -> Result<ServiceStatus, TargetError> {
        let output = self.run(&["query", service]).await?;
        if output.status.code() == Some(ERROR_SERVICE_DOES_NOT_EXIST) {
            return Ok(ServiceStatus::Missing);
        }
        if !output.status.success() {
            return Err(TargetError::Query(proc::failure_detail(&output)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let status = parse_query_state(&stdout).ok_or_else(|| {
            TargetError::Decode(format!("no STATE line in sc query output for `{service}`"))
        })?;
        debug!(%service, %status, "service state");
        Ok(status)
    }

    async fn set_automatic_start(&self, service: &str) -> Result<(), TargetError> {
        // sc's own quirk: the value is a separate argument after "start=".
        let output = self.run(&["config", service, "start=", "auto"]).await?;
        if !output.status.success() {
            return Err(TargetError::Execute(proc::failure_detail(&output)));
        }
        Ok(())
    }

    async fn start(&self, service: &str) -> Result<(), TargetError> {
        let output = self.run(&["start", service]).await?;
        if !output.status.success() {
            return Err(TargetError::Execute(proc::failure_detail(&output)));
        }
        Ok(())
    }
}

/// Pull the state word out of an `sc query` dump, e.g.
/// `        STATE              : 4  RUNNING`.
fn parse_query_state(stdout: &str) -> Option<ServiceStatus> {
    let state_line = stdout
        .lines()
        .find(|line| line.trim_start().starts_with("STATE"))?;
    let word = state_line.split_whitespace().last()?;
    Some(match word {
        "RUNNING" => ServiceStatus::Running,
        "STOPPED" => ServiceStatus::Stopped,
        "START_PENDING" => ServiceStatus::StartPending,
        other => ServiceStatus::Other(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING: &str = "\
SERVICE_NAME: SQLSERVERAGENT
        TYPE               : 10  WIN32_OWN_PROCESS
        STATE              : 4  RUNNING
                                (STOPPABLE, PAUSABLE, ACCEPTS_SHUTDOWN)
        WIN32_EXIT_CODE    : 0  (0x0)
";

    const STOPPED: &str = "\
SERVICE_NAME: SQLAgent$SQL2019
        TYPE               : 10  WIN32_OWN_PROCESS
        STATE              : 1  STOPPED
        WIN32_EXIT_CODE    : 1077  (0x435)
";

    #[test]
    fn parses_running_state() {
        assert_eq!(parse_query_state(RUNNING), Some(ServiceStatus::Running));
    }

    #[test]
    fn parses_stopped_state() {
        assert_eq!(parse_query_state(STOPPED), Some(ServiceStatus::Stopped));
    }

    #[test]
    fn parses_pending_state() {
        let dump = "        STATE              : 2  START_PENDING\n";
        assert_eq!(
            parse_query_state(dump),
            Some(ServiceStatus::StartPending)
        );
    }

    #[test]
    fn unknown_state_is_preserved_verbatim() {
        let dump = "        STATE              : 3  STOP_PENDING\n";
        assert_eq!(
            parse_query_state(dump),
            Some(ServiceStatus::Other("STOP_PENDING".to_string()))
        );
    }

    #[test]
    fn missing_state_line_is_none() {
        assert_eq!(parse_query_state("[SC] OpenService FAILED 1060:\n"), None);
    }
}
