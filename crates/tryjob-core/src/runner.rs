//! External command execution.
//!
//! Builds, test jobs, result extraction and host probes all go through a
//! [`CommandRunner`]. Each call blocks the run until the command exits and
//! returns its fully buffered output.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::error::{CommandFailure, RunnerError};

/// Output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Command line, program first.
    pub command: Vec<String>,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        let mut out = self.stdout.clone();
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// Backend that executes external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion.
    ///
    /// A non-zero exit is not an error here; it is reported through
    /// [`CommandOutput::exit_code`]. Errors mean the command never finished.
    async fn run(&self, command: &[String]) -> Result<CommandOutput, RunnerError>;
}

/// Run a command and turn anything but a clean exit into a [`CommandFailure`].
///
/// Returns the combined output on success.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    command: &[String],
) -> Result<String, CommandFailure> {
    match runner.run(command).await {
        Ok(output) if output.success() => Ok(output.combined()),
        Ok(output) => Err(CommandFailure {
            command: command.to_vec(),
            exit_code: output.exit_code,
            output: output.combined(),
        }),
        Err(e) => Err(CommandFailure {
            command: command.to_vec(),
            exit_code: -1,
            output: e.to_string(),
        }),
    }
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and fail any command that runs longer than `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &[String]) -> Result<CommandOutput, RunnerError> {
        let start = Instant::now();

        let (exe, args) = command.split_first().ok_or(RunnerError::EmptyCommand)?;

        debug!(command = %command.join(" "), "Spawning command");

        let child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: exe.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::Timeout {
                    command: command.join(" "),
                    secs: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            command: command.to_vec(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Build an owned command line from string slices.
pub fn command_line<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
