//! Error taxonomy for try-job orchestration.
//!
//! Every failure that comes from an external command keeps the command line
//! and its captured output so the notification can show what went wrong.
//! Whether a failure aborts the run is a property of the error value
//! ([`BuildFailure::is_fatal`]); the orchestrator decides what to do with it.

use std::path::PathBuf;

use crate::builder::Project;

/// An external command that exited unsuccessfully (or never ran).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{}` exited with code {}", .command.join(" "), .exit_code)]
pub struct CommandFailure {
    /// Full command line, program first.
    pub command: Vec<String>,

    /// Exit code, `-1` when the process could not be spawned or timed out.
    pub exit_code: i32,

    /// Combined stdout and stderr.
    pub output: String,
}

/// A project build failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{project} build failed: {failure}")]
pub struct BuildFailure {
    pub project: Project,
    #[source]
    pub failure: CommandFailure,
}

impl BuildFailure {
    /// Whether this failure must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        self.project.aborts_run_on_failure()
    }
}

/// A single try job failed. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("try job {job} failed: {failure}")]
pub struct JobFailure {
    pub job: String,
    #[source]
    pub failure: CommandFailure,
}

/// Result extraction for a report category failed. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("result extraction for {category} failed: {failure}")]
pub struct ReportParseFailure {
    pub category: String,
    #[source]
    pub failure: CommandFailure,
}

/// Errors raised by a [`CommandRunner`](crate::runner::CommandRunner).
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`MailTransport`](crate::notify::MailTransport).
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("no recipients")]
    NoRecipients,

    #[error("mailer command is empty")]
    EmptyMailer,

    #[error("failed to spawn mailer {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mailer exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("report_receivers has no entry for required category '{0}'")]
    MissingReceivers(String),

    #[error("job '{0}' is listed for this OS but has no try_job_target entry")]
    UnknownJob(String),

    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("invalid build type '{0}', expected release, debug or default")]
    InvalidBuildType(String),

    #[error("failed to resolve directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error of a try-job run.
#[derive(Debug, thiserror::Error)]
pub enum TryJobError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildFailure),

    #[error("failed to write report {path}: {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for try-job operations.
pub type Result<T> = std::result::Result<T, TryJobError>;
