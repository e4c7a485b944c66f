//! Project builds.
//!
//! Each [`Project`] knows its build command, which receivers hear about a
//! failed build and whether that failure ends the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::BuildFailure;
use crate::runner::{run_checked, CommandRunner};

/// Projects built before the jobs run, in build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Project {
    Chrome,
    Aquarium,
}

impl Project {
    /// All projects, in the order they are built.
    pub const ALL: [Project; 2] = [Project::Chrome, Project::Aquarium];

    pub fn name(&self) -> &'static str {
        match self {
            Project::Chrome => "chrome",
            Project::Aquarium => "aquarium",
        }
    }

    /// Receiver category notified when the build fails.
    pub fn failure_receivers(&self) -> &'static str {
        match self {
            Project::Chrome => "admin",
            Project::Aquarium => "aquarium",
        }
    }

    /// Every job needs chrome; only aquarium jobs need aquarium.
    pub fn aborts_run_on_failure(&self) -> bool {
        match self {
            Project::Chrome => true,
            Project::Aquarium => false,
        }
    }

    /// Source directory of this project, if one was given.
    pub fn source_dir<'a>(&self, config: &'a RunConfig) -> Option<&'a Path> {
        match self {
            Project::Chrome => config.chrome_dir.as_deref(),
            Project::Aquarium => config.aquarium_dir.as_deref(),
        }
    }

    /// `build_project <project> --type <type> --dir <dir> [--update|--sync]`
    pub fn build_command(&self, config: &RunConfig, src_dir: &Path) -> Vec<String> {
        let mut cmd = vec![
            config.tools.build_project.clone(),
            self.name().to_string(),
            "--type".to_string(),
            config.build_type.to_string(),
            "--dir".to_string(),
            src_dir.display().to_string(),
        ];
        if config.update {
            cmd.push("--update".to_string());
        } else if config.sync {
            cmd.push("--sync".to_string());
        }
        cmd
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build result per project. Projects that were not built count as ok.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub chrome_failed: bool,
    pub aquarium_failed: bool,
}

impl BuildStatus {
    pub fn mark_failed(&mut self, project: Project) {
        match project {
            Project::Chrome => self.chrome_failed = true,
            Project::Aquarium => self.aquarium_failed = true,
        }
    }

    pub fn failed(&self, project: Project) -> bool {
        match project {
            Project::Chrome => self.chrome_failed,
            Project::Aquarium => self.aquarium_failed,
        }
    }
}

/// Invokes the external build tool.
pub struct ProjectBuilder<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ProjectBuilder<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Build `project` from `src_dir`.
    pub async fn build(
        &self,
        project: Project,
        config: &RunConfig,
        src_dir: &Path,
    ) -> Result<(), BuildFailure> {
        let cmd = project.build_command(config, src_dir);
        info!(project = %project, dir = %src_dir.display(), "Building project");

        match run_checked(self.runner, &cmd).await {
            Ok(_) => {
                info!(project = %project, "Build finished");
                Ok(())
            }
            Err(failure) => {
                warn!(project = %project, exit_code = failure.exit_code, "Build failed");
                Err(BuildFailure { project, failure })
            }
        }
    }
}
