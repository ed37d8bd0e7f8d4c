//! Version-gated install/upgrade of the maintenance routines.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::target::SchedulerTarget;
use crate::version::{self, InstalledVersion, VersionRelation};
use drydock_core::types::InstallOutcome;

/// The routines the install gate manages, by deployed object name.
pub const ROUTINE_NAMES: &[&str] = &[
    "CommandExecute",
    "DatabaseBackup",
    "DatabaseIntegrityCheck",
    "IndexOptimize",
];

/// Named parameter controlling job creation inside the install script.
pub const CREATE_JOBS_PARAM: &str = "@CreateJobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Run the script verbatim.
    Fresh,
    /// Neutralize the job-creation flag first so an upgrade never touches
    /// the jobs that already exist.
    PreserveJobs,
}

/// Rewrite the single line that sets `@CreateJobs` from `'Y'` to `'N'`.
///
/// The patch is keyed by the parameter name and must match exactly one
/// line; zero matches means the script is not the one we expect, multiple
/// matches make the patch ambiguous. Both abort the run.
pub fn neutralize_create_jobs(lines: &[String]) -> Result<Vec<String>> {
    let mut patched = lines.to_vec();
    let mut matches = 0usize;

    for line in patched.iter_mut() {
        if sets_create_jobs(line) {
            matches += 1;
            *line = line.replacen("'Y'", "'N'", 1);
        }
    }

    match matches {
        0 => Err(EngineError::CreateJobsFlagMissing),
        1 => Ok(patched),
        count => Err(EngineError::CreateJobsFlagAmbiguous { count }),
    }
}

/// Whether `line` is the flag-setting statement, i.e. begins (after leading
/// whitespace) with `SET @CreateJobs`.
fn sets_create_jobs(line: &str) -> bool {
    let trimmed = line.trim_start();
    let Some(rest) = strip_prefix_ignore_ascii_case(trimmed, "SET") else {
        return false;
    };
    rest.trim_start().starts_with(CREATE_JOBS_PARAM)
}

fn strip_prefix_ignore_ascii_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

/// Execute the (possibly patched) script against the target. The text is
/// staged to a temp file so the executor can run it batch-by-batch with
/// abort-on-error semantics. Execution failure is fatal for the whole run.
pub async fn install(
    target: &dyn SchedulerTarget,
    lines: &[String],
    mode: InstallMode,
) -> Result<()> {
    let text = match mode {
        InstallMode::Fresh => lines.join("\n"),
        InstallMode::PreserveJobs => neutralize_create_jobs(lines)?.join("\n"),
    };

    let mut staged = tempfile::Builder::new()
        .prefix("drydock-install-")
        .suffix(".sql")
        .tempfile()?;
    staged.write_all(text.as_bytes())?;
    staged.flush()?;

    target.run_script(staged.path()).await?;
    Ok(())
}

/// The install gate: compare the script version against the deployed
/// routines and install, upgrade, or leave alone.
pub async fn converge_routines(
    target: &dyn SchedulerTarget,
    lines: &[String],
) -> Result<InstallOutcome> {
    let file_version = version::extract_version(lines, "install script")?;
    let inventory = target.routine_inventory(ROUTINE_NAMES).await?;
    let installed = version::summarize_inventory(&inventory)?;
    let relation = version::classify(installed.version(), file_version);

    match relation {
        VersionRelation::Absent => {
            info!(version = %file_version, "no maintenance routines deployed — fresh install");
            install(target, lines, InstallMode::Fresh).await?;
            Ok(InstallOutcome::Installed)
        }
        VersionRelation::Equal if !installed.drifted() => {
            debug!(version = %file_version, "maintenance routines already current");
            Ok(InstallOutcome::UpToDate)
        }
        VersionRelation::Newer => {
            warn!(
                script = %file_version,
                deployed = %installed.version().unwrap_or(file_version),
                "deployed routines are newer than the install script — update the source file"
            );
            Ok(InstallOutcome::SourceOutdated)
        }
        // Older, or any drifted deployment that is not ahead of the script.
        _ => {
            info!(
                script = %file_version,
                deployed = %installed.version().unwrap_or(file_version),
                drifted = installed.drifted(),
                "upgrading maintenance routines, preserving existing jobs"
            );
            install(target, lines, InstallMode::PreserveJobs).await?;
            Ok(InstallOutcome::Upgraded)
        }
    }
}
