//! Run configuration.
//!
//! A [`RunConfig`] is resolved once per invocation from the command-line
//! options ([`RunOptions`]) and the JSON document ([`TryJobDocument`]), then
//! passed by reference to every component. Nothing mutates it afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;
use crate::job::Category;

/// Receiver categories that must always be present.
pub const REQUIRED_RECEIVERS: [&str; 2] = ["admin", "aquarium"];

/// Binary flavour the jobs are built and run with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildType {
    #[default]
    Release,
    Debug,
    Default,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Release => "release",
            BuildType::Debug => "debug",
            BuildType::Default => "default",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(BuildType::Release),
            "debug" => Ok(BuildType::Debug),
            "default" => Ok(BuildType::Default),
            other => Err(ConfigError::InvalidBuildType(other.to_string())),
        }
    }
}

/// Host operating system, as used for job lists and baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Win,
    Linux,
    Mac,
}

impl Os {
    /// The OS this binary was compiled for.
    pub fn current() -> Result<Self, ConfigError> {
        if cfg!(target_os = "windows") {
            Ok(Os::Win)
        } else if cfg!(target_os = "linux") {
            Ok(Os::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(Os::Mac)
        } else {
            Err(ConfigError::UnsupportedOs(std::env::consts::OS.to_string()))
        }
    }

    /// Key used in `aquarium_average_fps`.
    pub fn name(&self) -> &'static str {
        match self {
            Os::Win => "win",
            Os::Linux => "linux",
            Os::Mac => "mac",
        }
    }

    /// Capitalised name used in report titles.
    pub fn title(&self) -> &'static str {
        match self {
            Os::Win => "Win",
            Os::Linux => "Linux",
            Os::Mac => "Mac",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `(kind, backend)` pair a job id resolves to.
///
/// Serialized as a two-element JSON array, e.g. `["webgl2", "d3d11"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct TargetSpec {
    pub kind: String,
    pub backend: String,
}

impl TargetSpec {
    pub fn new(kind: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            backend: backend.into(),
        }
    }
}

impl From<(String, String)> for TargetSpec {
    fn from((kind, backend): (String, String)) -> Self {
        Self { kind, backend }
    }
}

impl From<TargetSpec> for (String, String) {
    fn from(spec: TargetSpec) -> Self {
        (spec.kind, spec.backend)
    }
}

/// Names of the external tools the orchestrator drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    pub build_project: String,
    pub run_gpu_test: String,
    pub parse_result: String,

    /// Mailer command line; the message is written to its stdin.
    pub mailer: Vec<String>,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            build_project: "build_project".to_string(),
            run_gpu_test: "run_gpu_test".to_string(),
            parse_result: "parse_result".to_string(),
            mailer: vec!["sendmail".to_string(), "-t".to_string()],
        }
    }
}

/// The `try_job.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TryJobDocument {
    pub report_receivers: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub aquarium_average_fps: HashMap<String, HashMap<String, f64>>,

    #[serde(default)]
    pub win_jobs: Vec<String>,

    #[serde(default)]
    pub linux_jobs: Vec<String>,

    #[serde(default)]
    pub mac_jobs: Vec<String>,

    #[serde(default)]
    pub try_job_target: HashMap<String, TargetSpec>,

    #[serde(default)]
    pub try_job_shards: HashMap<String, u32>,

    #[serde(default)]
    pub tools: ToolCommands,
}

impl TryJobDocument {
    /// Load the document from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Ordered job list for an OS.
    pub fn jobs_for(&self, os: Os) -> &[String] {
        match os {
            Os::Win => &self.win_jobs,
            Os::Linux => &self.linux_jobs,
            Os::Mac => &self.mac_jobs,
        }
    }
}

/// Options supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub build_type: BuildType,
    pub chrome_dir: Option<PathBuf>,
    pub aquarium_dir: Option<PathBuf>,
    pub build: bool,
    pub update: bool,
    pub sync: bool,
    pub email: bool,

    /// Directory the report files are written to (cwd when unset).
    pub report_dir: Option<PathBuf>,

    /// Per-command timeout in seconds, 0 for none.
    pub timeout_secs: u64,
}

/// Immutable configuration for one try-job run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub build_type: BuildType,
    pub chrome_dir: Option<PathBuf>,
    pub aquarium_dir: Option<PathBuf>,
    pub build: bool,
    pub update: bool,
    pub sync: bool,
    pub email: bool,
    pub os: Os,
    pub report_receivers: HashMap<String, Vec<String>>,
    pub aquarium_average_fps: HashMap<String, HashMap<String, f64>>,
    pub try_jobs: Vec<String>,
    pub try_job_target: HashMap<String, TargetSpec>,
    pub try_job_shards: HashMap<String, u32>,
    pub tools: ToolCommands,
    pub report_dir: PathBuf,
    pub command_timeout: Option<Duration>,
}

impl RunConfig {
    /// Combine command-line options and the config document for `os`.
    ///
    /// Source directories are made absolute; a chrome checkout root that
    /// contains `src/` is replaced by that `src/` directory.
    pub fn resolve(
        options: RunOptions,
        document: TryJobDocument,
        os: Os,
    ) -> Result<Self, ConfigError> {
        for category in REQUIRED_RECEIVERS {
            if !document.report_receivers.contains_key(category) {
                return Err(ConfigError::MissingReceivers(category.to_string()));
            }
        }

        let try_jobs = document.jobs_for(os).to_vec();
        if let Some(job) = try_jobs
            .iter()
            .find(|job| !document.try_job_target.contains_key(*job))
        {
            return Err(ConfigError::UnknownJob(job.clone()));
        }
        for job in &try_jobs {
            let category = Category::from_kind(&document.try_job_target[job].kind);
            if !document.report_receivers.contains_key(category.as_str()) {
                return Err(ConfigError::MissingReceivers(category.to_string()));
            }
        }

        let chrome_dir = match options.chrome_dir {
            Some(dir) => {
                let dir = absolutize(&dir)?;
                let src = dir.join("src");
                Some(if src.exists() { src } else { dir })
            }
            None => None,
        };
        let aquarium_dir = options
            .aquarium_dir
            .as_deref()
            .map(absolutize)
            .transpose()?;
        let report_dir = match options.report_dir {
            Some(dir) => absolutize(&dir)?,
            None => current_dir()?,
        };
        let command_timeout =
            (options.timeout_secs > 0).then(|| Duration::from_secs(options.timeout_secs));

        debug!(os = %os, jobs = try_jobs.len(), "Resolved run configuration");

        Ok(Self {
            build_type: options.build_type,
            chrome_dir,
            aquarium_dir,
            build: options.build,
            update: options.update,
            sync: options.sync,
            email: options.email,
            os,
            report_receivers: document.report_receivers,
            aquarium_average_fps: document.aquarium_average_fps,
            try_jobs,
            try_job_target: document.try_job_target,
            try_job_shards: document.try_job_shards,
            tools: document.tools,
            report_dir,
            command_timeout,
        })
    }

    /// Whether projects should be (re)built before running jobs.
    ///
    /// Update and sync both imply a build.
    pub fn wants_build(&self) -> bool {
        self.build || self.update || self.sync
    }

    /// Recipients for a category, empty when none are configured.
    pub fn receivers(&self, category: &str) -> &[String] {
        self.report_receivers
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Baseline fps for a benchmark test on this OS.
    pub fn baseline_fps(&self, test_name: &str) -> Option<f64> {
        self.aquarium_average_fps
            .get(self.os.name())
            .and_then(|table| table.get(test_name))
            .copied()
    }
}

fn current_dir() -> Result<PathBuf, ConfigError> {
    std::env::current_dir().map_err(|source| ConfigError::Directory {
        path: PathBuf::from("."),
        source,
    })
}

fn absolutize(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(current_dir()?.join(path))
    }
}
