//! Try-job orchestration: build, run jobs, publish reports.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::aggregate::{AggregatedReport, ReportAggregator};
use crate::builder::{BuildStatus, Project, ProjectBuilder};
use crate::config::RunConfig;
use crate::error::Result;
use crate::host::{discover_gpu, source_revision, HostFacts};
use crate::job::{JobRunReport, JobRunner};
use crate::notify::{MailTransport, NotificationDispatcher};
use crate::parser::ReportParser;
use crate::runner::CommandRunner;

/// A report that went through the publish step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedReport {
    pub report: AggregatedReport,

    /// Where the report was written; `None` if writing failed.
    pub path: Option<PathBuf>,

    /// Whether the report was handed to the mail transport.
    pub emailed: bool,
}

/// Result of a complete try-job run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub build_status: BuildStatus,
    pub jobs: JobRunReport,
    pub reports: Vec<PublishedReport>,
    pub facts: HostFacts,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn passed_jobs(&self) -> usize {
        self.jobs.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed_jobs(&self) -> usize {
        self.jobs.outcomes.iter().filter(|o| !o.success).count()
    }
}

/// Sequences builds, jobs and report publishing.
pub struct TryJobOrchestrator {
    runner: Arc<dyn CommandRunner>,
    dispatcher: NotificationDispatcher,
}

impl TryJobOrchestrator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn MailTransport>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            dispatcher: NotificationDispatcher::new(transport, hostname),
        }
    }

    /// Execute a full try-job run.
    ///
    /// Only a chrome build failure is returned as an error; it is notified
    /// before the run aborts. Every other failure is notified and absorbed.
    pub async fn run(&self, config: &RunConfig, mut facts: HostFacts) -> Result<RunSummary> {
        let start = Instant::now();
        let runner = self.runner.as_ref();

        info!(os = %config.os, jobs = config.try_jobs.len(), "Starting try-job run");

        let build_status = self.build_projects(config, &mut facts).await?;

        let jobs = JobRunner::new(runner, &self.dispatcher)
            .run_all(config, &build_status)
            .await;

        if jobs.categories.iter().any(|c| !c.is_benchmark()) {
            facts.gpu = discover_gpu(runner, facts.os).await;
        }

        let reports = self.publish_reports(config, &facts, &jobs).await;

        let summary = RunSummary {
            build_status,
            jobs,
            reports,
            facts,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            passed = summary.passed_jobs(),
            failed = summary.failed_jobs(),
            reports = summary.reports.len(),
            "Try-job run finished"
        );
        Ok(summary)
    }

    async fn build_projects(
        &self,
        config: &RunConfig,
        facts: &mut HostFacts,
    ) -> Result<BuildStatus> {
        let runner = self.runner.as_ref();
        let builder = ProjectBuilder::new(runner);
        let mut status = BuildStatus::default();

        for project in Project::ALL {
            let Some(src_dir) = project.source_dir(config) else {
                continue;
            };

            if config.wants_build() {
                if let Err(failure) = builder.build(project, config, src_dir).await {
                    self.dispatcher
                        .notify_failure(
                            config.receivers(project.failure_receivers()),
                            &failure.failure,
                        )
                        .await;
                    if failure.is_fatal() {
                        error!(project = %project, "Build failed, aborting run");
                        return Err(failure.into());
                    }
                    warn!(project = %project, "Build failed, its jobs will be skipped");
                    status.mark_failed(project);
                }
            }

            let revision = source_revision(runner, src_dir).await;
            match project {
                Project::Chrome => facts.chrome_revision = revision,
                Project::Aquarium => facts.aquarium_revision = revision,
            }
        }

        Ok(status)
    }

    async fn publish_reports(
        &self,
        config: &RunConfig,
        facts: &HostFacts,
        jobs: &JobRunReport,
    ) -> Vec<PublishedReport> {
        let parser = ReportParser::new(self.runner.as_ref());
        let aggregator = ReportAggregator::new(config, facts);
        let mut published = Vec::new();

        for category in jobs.categories.iter() {
            let raw = match parser.fetch(category, config).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(failure) => {
                    warn!(category = %category, "Result extraction failed, skipping report");
                    self.dispatcher
                        .notify_failure(config.receivers("admin"), &failure.failure)
                        .await;
                    continue;
                }
            };

            let report = aggregator.build(category, &raw);
            info!(category = %category, title = %report.title, "Report ready");

            let path = match report.write_to(&config.report_dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    error!(category = %category, error = %e, "Cannot write report");
                    None
                }
            };

            if config.email {
                self.dispatcher
                    .deliver_report(config.receivers(category.as_str()), &report)
                    .await;
            }

            published.push(PublishedReport {
                report,
                path,
                emailed: config.email,
            });
        }

        published
    }
}
