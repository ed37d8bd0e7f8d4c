use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, Instrument};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use drydock_core::config::{DrydockConfig, LogConfig};
use drydock_core::logfile::{CappedLogFile, LocalTimer};
use drydock_engine::source::{FileScriptSource, ScriptSource};
use drydock_engine::{runner, version};
use drydock_mssql::{AgentClient, ScServiceController, SqlcmdExecutor};

/// Exit codes: 0 converged, 1 at least one job failed, 2 fatal error.
const EXIT_JOB_FAILURES: i32 = 1;
const EXIT_FATAL: i32 = 2;

#[derive(Parser)]
#[command(
    name = "drydock",
    version,
    about = "Converge SQL Server Agent maintenance jobs to a declared configuration"
)]
struct Cli {
    /// Config file (default: drydock.toml, DRYDOCK_* env overrides apply).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one convergence pass against the target server.
    Converge,
    /// Load and validate the configuration and install script, touch nothing.
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // The log already has details; leave one summary trace behind.
            error!("run aborted — check the log: {e:#}");
            eprintln!("drydock: {e:#}");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = DrydockConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.log).context("initializing logging")?;

    let span = tracing::info_span!(
        "run",
        pid = std::process::id(),
        principal = %current_user()
    );

    async {
        info!(
            server = %config.target.server_arg(),
            jobs = config.jobs.len(),
            "drydock starting"
        );
        match cli.cmd {
            Command::Validate => validate(&config),
            Command::Converge => converge(&config).await,
        }
    }
    .instrument(span)
    .await
}

/// Check the config and the install script's version marker without touching
/// the target.
fn validate(config: &DrydockConfig) -> anyhow::Result<i32> {
    let source = FileScriptSource::new(&config.install.script_path);
    let lines = source
        .read_lines()
        .with_context(|| format!("reading {}", source.describe()))?;
    let script_version = version::extract_version(&lines, "install script")?;

    let summary = serde_json::json!({
        "target": config.target.server_arg(),
        "agent_service": config.target.agent_service_name(),
        "script_version": script_version.to_string(),
        "jobs": &config.jobs,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(0)
}

async fn converge(config: &DrydockConfig) -> anyhow::Result<i32> {
    let executor = SqlcmdExecutor::new(&config.target);
    let target = AgentClient::new(executor);
    let services = ScServiceController::new();
    let source = FileScriptSource::new(&config.install.script_path);

    let report = runner::run(&target, &services, &source, config).await?;

    for entry in &report.jobs {
        match &entry.result {
            Ok(job) => {
                let schedule = job.schedule.map_or("-".to_string(), |s| s.to_string());
                let step = job.step.map_or("-".to_string(), |s| s.to_string());
                info!(
                    job = %job.name,
                    enabled = job.enabled,
                    schedule = %schedule,
                    step = %step,
                    "converged"
                );
            }
            Err(e) => error!(job = %entry.name, error = %e, "failed"),
        }
    }

    if report.ok() {
        Ok(0)
    } else {
        error!(
            failed = report.failed_jobs(),
            total = report.jobs.len(),
            "convergence pass finished with failures"
        );
        Ok(EXIT_JOB_FAILURES)
    }
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimer);

    match &log.path {
        Some(path) => {
            let file = CappedLogFile::new(path, log.max_bytes)?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file)
                .with_timer(LocalTimer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
        }
    }
    Ok(())
}

fn current_user() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string())
}
