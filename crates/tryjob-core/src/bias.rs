//! Benchmark bias against the stored per-OS baseline.

use tracing::warn;

use crate::config::RunConfig;
use crate::parser::parse_benchmark_samples;

/// Percentage deviation of `measured` from `baseline`, truncated toward zero.
///
/// Returns `None` for a zero or non-finite baseline.
pub fn compute_bias(measured: i64, baseline: f64) -> Option<i64> {
    if baseline == 0.0 || !baseline.is_finite() {
        return None;
    }
    Some(((measured as f64 - baseline) * 100.0 / baseline).trunc() as i64)
}

/// `+N` for non-negative biases, `-N` otherwise.
pub fn signed_percent(bias: i64) -> String {
    if bias >= 0 {
        format!("+{bias}")
    } else {
        bias.to_string()
    }
}

/// A measured test with its bias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiasEntry {
    pub name: String,
    pub value: i64,
    pub bias: i64,
}

/// Benchmark report with every measured line annotated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchmarkReport {
    /// Report lines; measured lines end with ` (+N%)` / ` (-N%)`.
    pub lines: Vec<String>,
    pub entries: Vec<BiasEntry>,

    /// Bias of greatest magnitude, sign kept; the first one wins ties.
    pub max_bias: i64,
}

impl BenchmarkReport {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Annotates benchmark reports with their bias.
pub struct BiasCalculator<'a> {
    config: &'a RunConfig,
}

impl<'a> BiasCalculator<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Bias of one measurement, `None` without a usable baseline.
    pub fn bias(&self, name: &str, measured: i64) -> Option<i64> {
        let baseline = self.config.baseline_fps(name)?;
        compute_bias(measured, baseline)
    }

    pub fn annotate(&self, report: &str) -> BenchmarkReport {
        let mut lines: Vec<String> = report.lines().map(str::to_string).collect();
        let mut entries = Vec::new();
        let mut max_bias = 0i64;

        for sample in parse_benchmark_samples(report) {
            let Some(bias) = self.bias(&sample.name, sample.value) else {
                warn!(
                    test = %sample.name,
                    os = %self.config.os,
                    "No usable baseline fps, leaving line unannotated"
                );
                continue;
            };

            lines[sample.line].push_str(&format!(" ({}%)", signed_percent(bias)));
            if bias.abs() > max_bias.abs() {
                max_bias = bias;
            }
            entries.push(BiasEntry {
                name: sample.name,
                value: sample.value,
                bias,
            });
        }

        BenchmarkReport {
            lines,
            entries,
            max_bias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Os, RunOptions, TryJobDocument};
    use std::collections::HashMap;

    fn config(baselines: &[(&str, f64)]) -> RunConfig {
        let table: HashMap<String, f64> = baselines
            .iter()
            .map(|(name, fps)| (name.to_string(), *fps))
            .collect();
        let document = TryJobDocument {
            report_receivers: HashMap::from([
                ("admin".to_string(), vec![]),
                ("aquarium".to_string(), vec![]),
            ]),
            aquarium_average_fps: HashMap::from([("linux".to_string(), table)]),
            ..TryJobDocument::default()
        };
        RunConfig::resolve(RunOptions::default(), document, Os::Linux).unwrap()
    }

    #[test]
    fn test_bias_truncates_toward_zero() {
        assert_eq!(compute_bias(58, 60.0), Some(-3));
        assert_eq!(compute_bias(62, 60.0), Some(3));
        assert_eq!(compute_bias(60, 60.0), Some(0));
        assert_eq!(compute_bias(59, 60.0), Some(-1));
        assert_eq!(compute_bias(30, 45.5), Some(-34));
    }

    #[test]
    fn test_bias_without_baseline() {
        assert_eq!(compute_bias(58, 0.0), None);
        assert_eq!(compute_bias(58, f64::NAN), None);
    }

    #[test]
    fn test_signed_percent() {
        assert_eq!(signed_percent(0), "+0");
        assert_eq!(signed_percent(12), "+12");
        assert_eq!(signed_percent(-3), "-3");
    }

    #[test]
    fn test_annotates_example_report() {
        let cfg = config(&[("d3d12", 60.0), ("metal", 60.0)]);
        let report = BiasCalculator::new(&cfg)
            .annotate("aquarium_d3d12_test 58\naquarium_metal_test 60");
        assert_eq!(
            report.lines,
            vec![
                "aquarium_d3d12_test 58 (-3%)".to_string(),
                "aquarium_metal_test 60 (+0%)".to_string(),
            ]
        );
        assert_eq!(report.max_bias, -3);
        assert_eq!(report.entries.len(), 2);
    }

    #[test]
    fn test_max_bias_keeps_first_of_equal_magnitude() {
        let cfg = config(&[("a", 100.0), ("b", 100.0)]);
        let report = BiasCalculator::new(&cfg).annotate("aquarium_a_test 95\naquarium_b_test 105");
        assert_eq!(report.max_bias, -5);

        let report = BiasCalculator::new(&cfg).annotate("aquarium_b_test 105\naquarium_a_test 95");
        assert_eq!(report.max_bias, 5);
    }

    #[test]
    fn test_max_bias_picks_largest_magnitude() {
        let cfg = config(&[("a", 100.0), ("b", 100.0)]);
        let report = BiasCalculator::new(&cfg).annotate("aquarium_a_test 110\naquarium_b_test 80");
        assert_eq!(report.max_bias, -20);
    }

    #[test]
    fn test_missing_baseline_leaves_line_alone() {
        let cfg = config(&[("d3d12", 60.0)]);
        let report = BiasCalculator::new(&cfg)
            .annotate("Revision abc\naquarium_vulkan_test 50\naquarium_d3d12_test 66");
        assert_eq!(report.lines[0], "Revision abc");
        assert_eq!(report.lines[1], "aquarium_vulkan_test 50");
        assert_eq!(report.lines[2], "aquarium_d3d12_test 66 (+10%)");
        assert_eq!(report.max_bias, 10);
        assert_eq!(report.text().lines().count(), 3);
    }
}
