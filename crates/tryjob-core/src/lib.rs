//! GPU try-job orchestration
//!
//! Provides the pieces of a try-job run:
//! - Builds chrome and aquarium, with per-project failure policy
//! - Runs the configured GPU test jobs, isolating failures
//! - Parses test and benchmark reports, computes fps bias
//! - Writes and mails the aggregated reports

pub mod aggregate;
pub mod bias;
pub mod builder;
pub mod config;
pub mod error;
pub mod fakes;
pub mod host;
pub mod job;
pub mod notify;
pub mod orchestrator;
pub mod parser;
pub mod runner;
pub mod telemetry;

// Re-export key types
pub use aggregate::{AggregatedReport, ParsedMetrics, ReportAggregator};
pub use bias::{BenchmarkReport, BiasCalculator};
pub use builder::{BuildStatus, Project, ProjectBuilder};
pub use config::{BuildType, Os, RunConfig, RunOptions, TargetSpec, TryJobDocument};
pub use error::{
    BuildFailure, CommandFailure, ConfigError, JobFailure, ReportParseFailure, Result,
    TryJobError,
};
pub use host::{GpuInfo, HostFacts};
pub use job::{Category, Job, JobOutcome, JobRunner};
pub use notify::{MailTransport, NotificationDispatcher, SendmailTransport};
pub use orchestrator::{PublishedReport, RunSummary, TryJobOrchestrator};
pub use parser::{ReportParser, TestCounters};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use telemetry::init_tracing;
