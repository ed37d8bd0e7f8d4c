//! Bounded subprocess execution shared by the sqlcmd and sc adapters.

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use drydock_engine::target::TargetError;

/// Spawn `program` with `args`, capture its output, and enforce a wall-clock
/// deadline. The child is killed when the deadline expires or the future is
/// dropped.
pub(crate) async fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Output, TargetError> {
    let child = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TargetError::Unavailable(format!("failed to launch {program}: {e}")))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(TargetError::Unavailable(format!("{program} failed: {e}"))),
        Err(_elapsed) => Err(TargetError::Unavailable(format!(
            "{program} timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Stdout/stderr of a failed call, flattened for an error message.
pub(crate) fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    format!("exit {code}: {}", detail.trim())
}
