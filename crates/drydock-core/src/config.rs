use chrono::NaiveTime;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "drydock.toml";
pub const DEFAULT_DATABASE: &str = "master";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
/// Log file is cleared once it grows past this many bytes.
pub const DEFAULT_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Top-level config (drydock.toml + DRYDOCK_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrydockConfig {
    pub target: TargetConfig,
    pub install: InstallConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Declared maintenance jobs, reconciled in declaration order.
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

impl DrydockConfig {
    /// Load config from a TOML file with DRYDOCK_* env var overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);

        let config: DrydockConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("DRYDOCK_").split("_"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;
        for (i, job) in self.jobs.iter().enumerate() {
            job.validate()?;
            // Duplicate names would make the run order-dependent.
            if self.jobs[..i].iter().any(|other| other.name == job.name) {
                return Err(CoreError::InvalidJobSpec {
                    job: job.name.clone(),
                    reason: "declared more than once".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Host name of the target server.
    pub server: String,
    /// Named instance; the default instance when omitted.
    #[serde(default)]
    pub instance: Option<String>,
    /// Database the maintenance routines are installed into.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Wall-clock limit for a single remote call, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl TargetConfig {
    /// `server` or `server\instance`, as passed to the client tool.
    pub fn server_arg(&self) -> String {
        match &self.instance {
            Some(instance) => format!("{}\\{}", self.server, instance),
            None => self.server.clone(),
        }
    }

    /// Windows service name of the Agent for this instance.
    pub fn agent_service_name(&self) -> String {
        match &self.instance {
            Some(instance) => format!("SQLAgent${instance}"),
            None => "SQLSERVERAGENT".to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.auth.mode == AuthMode::SqlLogin
            && (self.auth.username.is_none() || self.auth.password.is_none())
        {
            return Err(CoreError::Config(
                "auth mode `sql-login` requires both username and password".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Trusted,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Integrated/Windows authentication.
    #[default]
    Trusted,
    /// SQL login with username + password.
    SqlLogin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Path to the maintenance-routine install script.
    pub script_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log file destination. Logging goes to stderr only when unset.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: DEFAULT_LOG_MAX_BYTES,
        }
    }
}

/// One declared maintenance job. The job must already exist on the target;
/// drydock configures jobs, it never creates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Exact Agent job name.
    pub name: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Managed schedule. Jobs without one keep whatever schedules they have.
    #[serde(default)]
    pub schedule: Option<ScheduleSpec>,
    /// Parameter fragment appended to the primary step's command text when
    /// not already present.
    #[serde(default)]
    pub step_append: Option<String>,
}

impl JobSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Config("job with empty name".to_string()));
        }
        if let Some(schedule) = &self.schedule {
            schedule.validate(&self.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub frequency: Frequency,
    /// Weekdays the job fires on. Required for weekly, forbidden for daily.
    #[serde(default)]
    pub days: Vec<DayOfWeek>,
    /// Single daily time-of-day, e.g. "00:30:00".
    pub time: NaiveTime,
}

impl ScheduleSpec {
    /// Agent weekday bitmask for a weekly schedule.
    pub fn day_mask(&self) -> i32 {
        self.days.iter().fold(0, |mask, day| mask | day.bit())
    }

    fn validate(&self, job: &str) -> Result<()> {
        match self.frequency {
            Frequency::Weekly if self.days.is_empty() => Err(CoreError::InvalidJobSpec {
                job: job.to_string(),
                reason: "weekly schedule needs at least one day".to_string(),
            }),
            Frequency::Daily if !self.days.is_empty() => Err(CoreError::InvalidJobSpec {
                job: job.to_string(),
                reason: "daily schedule must not list days".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    /// Display label, also the prefix of synthesized schedule names.
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
        }
    }

    /// Agent freq_type code.
    pub fn freq_type(&self) -> i32 {
        match self {
            Frequency::Daily => 4,
            Frequency::Weekly => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    /// Agent freq_interval bit for this weekday.
    pub fn bit(&self) -> i32 {
        match self {
            DayOfWeek::Sunday => 1,
            DayOfWeek::Monday => 2,
            DayOfWeek::Tuesday => 4,
            DayOfWeek::Wednesday => 8,
            DayOfWeek::Thursday => 16,
            DayOfWeek::Friday => 32,
            DayOfWeek::Saturday => 64,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}
fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}
fn default_log_max_bytes() -> u64 {
    DEFAULT_LOG_MAX_BYTES
}
