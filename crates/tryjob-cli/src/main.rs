//! run-try-job - build projects, run GPU try jobs and publish their reports
//!
//! The test configuration is read from `try_job.json` next to the executable
//! unless `--config` (or `TRY_JOB_CONFIG`) points elsewhere.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

use tryjob_core::host::hostname;
use tryjob_core::{
    BuildType, HostFacts, Os, ProcessRunner, RunConfig, RunOptions, RunSummary,
    SendmailTransport, TryJobDocument, TryJobOrchestrator,
};

const DEFAULT_CONFIG_NAME: &str = "try_job.json";

#[derive(Parser)]
#[command(name = "run-try-job")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run GPU try jobs and mail the reports", long_about = None)]
struct Cli {
    /// Browser build type; binaries are expected in out/Release, out/Debug or out/Default
    #[arg(short = 't', long = "type", default_value = "release")]
    build_type: BuildType,

    /// Chrome source directory
    #[arg(short, long)]
    chrome_dir: Option<PathBuf>,

    /// Aquarium source directory
    #[arg(short, long)]
    aquarium_dir: Option<PathBuf>,

    /// Rebuild all targets before running tests
    #[arg(short, long)]
    build: bool,

    /// Fetch, rebase and sync dependencies before building (implies --build)
    #[arg(short, long)]
    update: bool,

    /// Sync dependencies before building (implies --build)
    #[arg(short, long)]
    sync: bool,

    /// Send the reports by email
    #[arg(short, long)]
    email: bool,

    /// Path to the try-job configuration
    #[arg(long, env = "TRY_JOB_CONFIG")]
    config: Option<PathBuf>,

    /// Directory the report files are written to (default: current directory)
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Kill any build, job or extraction running longer than this (0 = never)
    #[arg(long, default_value = "0")]
    timeout_secs: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            build_type: self.build_type,
            chrome_dir: self.chrome_dir.clone(),
            aquarium_dir: self.aquarium_dir.clone(),
            build: self.build,
            update: self.update,
            sync: self.sync,
            email: self.email,
            report_dir: self.report_dir.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the executable")?;
    let dir = exe
        .parent()
        .context("Executable has no parent directory")?;
    Ok(dir.join(DEFAULT_CONFIG_NAME))
}

fn print_reports(summary: &RunSummary) {
    for published in &summary.reports {
        println!(
            "\n--------------------------------------------------\n{}\n\n{}",
            published.report.title, published.report.body
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tryjob_core::init_tracing(cli.json, level);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let document = TryJobDocument::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let os = Os::current()?;
    let config = RunConfig::resolve(cli.run_options(), document, os)
        .context("Invalid try-job configuration")?;

    info!(config = %config_path.display(), build_type = %config.build_type, "Loaded configuration");

    let runner = Arc::new(ProcessRunner::with_timeout(config.command_timeout));
    let transport = Arc::new(SendmailTransport::new(config.tools.mailer.clone()));
    let facts = HostFacts::detect(os);
    let orchestrator = TryJobOrchestrator::new(runner, transport, hostname());

    let summary = orchestrator.run(&config, facts).await?;
    print_reports(&summary);

    info!(
        passed = summary.passed_jobs(),
        failed = summary.failed_jobs(),
        skipped = summary.jobs.skipped.len(),
        duration_ms = summary.duration_ms,
        "Done"
    );
    Ok(())
}
