//! Try-job resolution and execution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::builder::{BuildStatus, Project};
use crate::config::RunConfig;
use crate::error::JobFailure;
use crate::notify::NotificationDispatcher;
use crate::runner::{run_checked, CommandRunner};

/// Test kind whose jobs need the aquarium build.
pub const AQUARIUM_KIND: &str = "aquarium";

/// Report grouping key a successful job is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub const WEBGL: &'static str = "webgl";
    pub const GTEST: &'static str = "gtest";
    pub const AQUARIUM: &'static str = AQUARIUM_KIND;

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// All `webgl*` kinds share the `webgl` report.
    pub fn from_kind(kind: &str) -> Self {
        if kind.starts_with(Self::WEBGL) {
            Self::new(Self::WEBGL)
        } else {
            Self::new(kind)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Benchmark reports carry fps values instead of pass/fail counters.
    pub fn is_benchmark(&self) -> bool {
        self.0 == Self::AQUARIUM
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A try job resolved against the target and shard tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub kind: String,
    pub backend: String,
    pub shards: Option<u32>,
}

impl Job {
    /// Resolve `id`, or `None` if it has no target entry.
    pub fn resolve(id: &str, config: &RunConfig) -> Option<Self> {
        let target = config.try_job_target.get(id)?;
        Some(Self {
            id: id.to_string(),
            kind: target.kind.clone(),
            backend: target.backend.clone(),
            shards: resolve_shards(&target.kind, &target.backend, &config.try_job_shards),
        })
    }

    pub fn is_aquarium(&self) -> bool {
        self.kind == AQUARIUM_KIND
    }

    pub fn category(&self) -> Category {
        Category::from_kind(&self.kind)
    }

    /// Project whose source tree this job runs from.
    pub fn project(&self) -> Project {
        if self.is_aquarium() {
            Project::Aquarium
        } else {
            Project::Chrome
        }
    }

    /// `run_gpu_test <kind> --backend <b> --type <t> --dir <d> [--shard N]`
    pub fn command(&self, config: &RunConfig, src_dir: &Path) -> Vec<String> {
        let mut cmd = vec![
            config.tools.run_gpu_test.clone(),
            self.kind.clone(),
            "--backend".to_string(),
            self.backend.clone(),
            "--type".to_string(),
            config.build_type.to_string(),
            "--dir".to_string(),
            src_dir.display().to_string(),
        ];
        if let Some(shards) = self.shards {
            cmd.push("--shard".to_string());
            cmd.push(shards.to_string());
        }
        cmd
    }
}

/// Shard count for a job: `<kind>_<backend>` first, then `<kind>`.
pub fn resolve_shards(kind: &str, backend: &str, table: &HashMap<String, u32>) -> Option<u32> {
    [format!("{kind}_{backend}"), kind.to_string()]
        .iter()
        .find_map(|key| table.get(key).copied())
}

/// Outcome of one executed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job: String,
    pub success: bool,
    pub output: String,
}

/// Categories in discovery order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySet {
    ordered: Vec<Category>,
}

impl CategorySet {
    /// Returns `true` if the category was not present yet.
    pub fn insert(&mut self, category: Category) -> bool {
        if self.ordered.contains(&category) {
            return false;
        }
        self.ordered.push(category);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.ordered.iter()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.ordered.iter().any(|c| c.as_str() == category)
    }
}

/// Result of running the job list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRunReport {
    pub outcomes: Vec<JobOutcome>,
    pub skipped: Vec<String>,
    pub categories: CategorySet,
}

/// Runs the configured jobs one after another.
pub struct JobRunner<'a> {
    runner: &'a dyn CommandRunner,
    dispatcher: &'a NotificationDispatcher,
}

impl<'a> JobRunner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, dispatcher: &'a NotificationDispatcher) -> Self {
        Self { runner, dispatcher }
    }

    /// Run every job for the current OS in configured order.
    ///
    /// A failed job is notified to `admin` and never stops the loop. Aquarium
    /// jobs are skipped silently when the aquarium build failed.
    pub async fn run_all(&self, config: &RunConfig, status: &BuildStatus) -> JobRunReport {
        let mut report = JobRunReport::default();

        for id in &config.try_jobs {
            let Some(job) = Job::resolve(id, config) else {
                warn!(job = %id, "No target for try job, skipping");
                report.skipped.push(id.clone());
                continue;
            };

            if job.is_aquarium() && status.failed(Project::Aquarium) {
                info!(job = %job.id, "Aquarium build failed, skipping job");
                report.skipped.push(job.id);
                continue;
            }

            let Some(src_dir) = job.project().source_dir(config) else {
                warn!(
                    job = %job.id,
                    project = %job.project(),
                    "No source directory for try job, skipping"
                );
                report.skipped.push(job.id);
                continue;
            };

            match self.run_job(&job, config, src_dir).await {
                Ok(output) => {
                    report.categories.insert(job.category());
                    report.outcomes.push(JobOutcome {
                        job: job.id,
                        success: true,
                        output,
                    });
                }
                Err(err) => {
                    self.dispatcher
                        .notify_failure(config.receivers("admin"), &err.failure)
                        .await;
                    report.outcomes.push(JobOutcome {
                        job: err.job,
                        success: false,
                        output: err.failure.output,
                    });
                }
            }
        }

        report
    }

    async fn run_job(
        &self,
        job: &Job,
        config: &RunConfig,
        src_dir: &Path,
    ) -> Result<String, JobFailure> {
        let cmd = job.command(config, src_dir);
        info!(job = %job.id, kind = %job.kind, backend = %job.backend, "Running try job");

        run_checked(self.runner, &cmd).await.map_err(|failure| {
            warn!(job = %job.id, exit_code = failure.exit_code, "Try job failed");
            JobFailure {
                job: job.id.clone(),
                failure,
            }
        })
    }
}
