//! Result extraction and report grammars.
//!
//! The report text is produced by the external `parse_result` tool. Two line
//! grammars are understood:
//!
//! - test reports carry `[Flaky Pass:N]`, `[New Pass:N]` and `[New Fail:N]`
//!   directives, summed independently over all lines;
//! - benchmark reports carry `aquarium_<name>_test <fps>` lines.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::error::ReportParseFailure;
use crate::job::Category;
use crate::runner::{run_checked, CommandRunner};

fn flaky_pass_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*\[Flaky Pass:(\d+)\]").expect("valid regex"))
}

fn new_pass_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*\[New Pass:(\d+)\]").expect("valid regex"))
}

fn new_fail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*\[New Fail:(\d+)\]").expect("valid regex"))
}

fn benchmark_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^aquarium_(\S+)_test\s+(\d+)$").expect("valid regex"))
}

/// Summed directive counters of a test report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounters {
    pub flaky_pass: u64,
    pub new_pass: u64,
    pub new_fail: u64,
}

/// One `aquarium_<name>_test <fps>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkSample {
    /// Index of the line within the report.
    pub line: usize,
    pub name: String,
    pub value: i64,
}

fn capture_count(re: &Regex, line: &str) -> Option<u64> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Sum the directives of a generic test report.
///
/// Each directive is checked on every line, so one line can contribute to
/// several counters. Sums saturate at `u64::MAX`.
pub fn parse_test_counters(report: &str) -> TestCounters {
    let mut counters = TestCounters::default();
    for line in report.lines() {
        if let Some(n) = capture_count(flaky_pass_re(), line) {
            counters.flaky_pass = counters.flaky_pass.saturating_add(n);
        }
        if let Some(n) = capture_count(new_pass_re(), line) {
            counters.new_pass = counters.new_pass.saturating_add(n);
        }
        if let Some(n) = capture_count(new_fail_re(), line) {
            counters.new_fail = counters.new_fail.saturating_add(n);
        }
    }
    counters
}

/// Extract the benchmark samples of an aquarium report.
pub fn parse_benchmark_samples(report: &str) -> Vec<BenchmarkSample> {
    report
        .lines()
        .enumerate()
        .filter_map(|(line, text)| {
            let caps = benchmark_re().captures(text)?;
            let value = match caps[2].parse::<i64>() {
                Ok(value) => value,
                Err(e) => {
                    warn!(line = text, error = %e, "Benchmark value out of range");
                    return None;
                }
            };
            Some(BenchmarkSample {
                line,
                name: caps[1].to_string(),
                value,
            })
        })
        .collect()
}

/// Fetches raw report text per category through the `parse_result` tool.
pub struct ReportParser<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ReportParser<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Raw report for `category`, or `None` when the tool printed nothing.
    pub async fn fetch(
        &self,
        category: &Category,
        config: &RunConfig,
    ) -> Result<Option<String>, ReportParseFailure> {
        let cmd = vec![
            config.tools.parse_result.clone(),
            category.as_str().to_string(),
        ];
        debug!(category = %category, "Extracting results");

        let report = run_checked(self.runner, &cmd)
            .await
            .map_err(|failure| ReportParseFailure {
                category: category.to_string(),
                failure,
            })?;

        if report.trim().is_empty() {
            info!(category = %category, "Empty report, nothing to publish");
            return Ok(None);
        }
        Ok(Some(report))
    }
}
