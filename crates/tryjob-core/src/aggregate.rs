//! Report aggregation: title, header and body for one category.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::bias::{signed_percent, BenchmarkReport, BiasCalculator};
use crate::config::RunConfig;
use crate::error::{Result, TryJobError};
use crate::host::HostFacts;
use crate::job::Category;
use crate::parser::{parse_test_counters, TestCounters};

/// Structured data extracted from one raw report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMetrics {
    Tests(TestCounters),
    Benchmark(BenchmarkReport),
}

impl ParsedMetrics {
    /// Parse `raw` with the grammar of `category`.
    pub fn parse(category: &Category, raw: &str, calculator: &BiasCalculator<'_>) -> Self {
        if category.is_benchmark() {
            ParsedMetrics::Benchmark(calculator.annotate(raw))
        } else {
            ParsedMetrics::Tests(parse_test_counters(raw))
        }
    }
}

/// A finished report, ready to be written and mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedReport {
    pub category: Category,
    pub title: String,
    pub body: String,
}

impl AggregatedReport {
    /// File the report is persisted to.
    pub fn file_name(&self) -> String {
        report_file_name(&self.category)
    }

    /// Write title and body to `dir`, returning the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        let content = format!("{}\n\n{}\n", self.title, self.body.trim_end_matches('\n'));
        std::fs::write(&path, content).map_err(|source| TryJobError::WriteReport {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// `<category>_test_report.txt`, or `gtest_report.txt` for gtest.
pub fn report_file_name(category: &Category) -> String {
    if category.as_str() == Category::GTEST {
        format!("{category}_report.txt")
    } else {
        format!("{category}_test_report.txt")
    }
}

/// Notice for a benchmark report: ` No Bias` or ` [Max Bias:+N%]`.
pub fn benchmark_notice(max_bias: i64) -> String {
    if max_bias == 0 {
        " No Bias".to_string()
    } else {
        format!(" [Max Bias:{}%]", signed_percent(max_bias))
    }
}

/// Notice for a test report; pass counters only count for webgl.
pub fn test_notice(category: &Category, counters: &TestCounters) -> String {
    let is_webgl = category.as_str() == Category::WEBGL;
    let mut notice = String::new();
    if counters.new_fail > 0 {
        let _ = write!(notice, " [New Fail:{}]", counters.new_fail);
    }
    if is_webgl && counters.new_pass > 0 {
        let _ = write!(notice, " [New Pass:{}]", counters.new_pass);
    }
    if is_webgl && counters.flaky_pass > 0 {
        let _ = write!(notice, " [Flaky Pass:{}]", counters.flaky_pass);
    }
    if notice.is_empty() {
        notice.push_str(" All Clear");
    }
    notice
}

fn test_label(category: &Category) -> &str {
    match category.as_str() {
        Category::WEBGL => "WebGL Test",
        Category::GTEST => "GTest",
        other => other,
    }
}

/// Composes reports from parsed metrics and host facts.
pub struct ReportAggregator<'a> {
    config: &'a RunConfig,
    facts: &'a HostFacts,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(config: &'a RunConfig, facts: &'a HostFacts) -> Self {
        Self { config, facts }
    }

    /// Parse `raw` for `category` and aggregate it.
    pub fn build(&self, category: &Category, raw: &str) -> AggregatedReport {
        let calculator = BiasCalculator::new(self.config);
        let metrics = ParsedMetrics::parse(category, raw, &calculator);
        self.aggregate(category, &metrics, raw)
    }

    pub fn aggregate(
        &self,
        category: &Category,
        metrics: &ParsedMetrics,
        raw: &str,
    ) -> AggregatedReport {
        let (title, body) = match metrics {
            ParsedMetrics::Benchmark(report) => (
                format!(
                    "Aquarium Test Report - {} / {} -{}",
                    self.facts.os.title(),
                    self.facts.hostname,
                    benchmark_notice(report.max_bias)
                ),
                self.benchmark_header() + &report.text(),
            ),
            ParsedMetrics::Tests(counters) => (
                format!(
                    "{} Report - {} / {} -{}",
                    test_label(category),
                    self.facts.os.title(),
                    self.facts.hostname,
                    test_notice(category, counters)
                ),
                self.test_header() + raw,
            ),
        };

        AggregatedReport {
            category: category.clone(),
            title,
            body,
        }
    }

    fn location_line(&self) -> String {
        format!("Location: {}\n", self.facts.work_dir.display())
    }

    fn benchmark_header(&self) -> String {
        let mut header = self.location_line();
        if let Some(rev) = &self.facts.aquarium_revision {
            let _ = writeln!(header, "Revision: {rev}");
        }
        header
    }

    fn test_header(&self) -> String {
        let mut header = self.location_line();
        if let Some(rev) = &self.facts.chrome_revision {
            let _ = writeln!(header, "Revision: {rev}");
        }
        if let Some(gpu) = &self.facts.gpu.name {
            let _ = writeln!(header, "GPU: {gpu}");
        }
        if let Some(driver) = &self.facts.gpu.driver_version {
            let _ = writeln!(header, "Driver: {driver}");
        }
        header
    }
}
