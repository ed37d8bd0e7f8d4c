use thiserror::Error;

use crate::target::TargetError;

/// Errors that can occur within the convergence engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The marker convention is broken: no version line at all.
    #[error("no version marker found in {0}")]
    VersionMarkerMissing(String),

    /// The marker is present but its token is not a valid timestamp.
    #[error("version token `{token}` in {what} is not a valid timestamp")]
    VersionTokenInvalid { token: String, what: String },

    /// The install script is unreadable.
    #[error("install script unreadable: {0}")]
    ScriptUnreadable(String),

    /// The preserve-jobs patch found no line setting the job-creation flag.
    #[error("no line in the install script sets @CreateJobs — refusing to patch")]
    CreateJobsFlagMissing,

    /// The preserve-jobs patch would touch more than one line.
    #[error("{count} lines in the install script set @CreateJobs — refusing ambiguous patch")]
    CreateJobsFlagAmbiguous { count: usize },

    /// The Agent service does not exist on the target machine.
    #[error("Agent service `{service}` does not exist on the target")]
    AgentServiceMissing { service: String },

    /// The Agent service could not be brought into the running state.
    #[error("Agent service `{service}` could not be started (state: {state})")]
    AgentServiceNotRunning { service: String, state: String },

    /// A declared job has no counterpart on the target.
    #[error("job `{name}` was not found on the target")]
    JobNotFound { name: String },

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
