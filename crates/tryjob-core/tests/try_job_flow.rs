//! Integration tests for a full try-job run with scripted commands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tryjob_core::fakes::{MemoryMailer, ScriptedRunner};
use tryjob_core::{
    HostFacts, Os, Project, RunConfig, RunOptions, TargetSpec, TryJobDocument, TryJobError,
    TryJobOrchestrator,
};

fn document() -> TryJobDocument {
    TryJobDocument {
        report_receivers: HashMap::from([
            ("admin".to_string(), vec!["admin@example.com".to_string()]),
            ("aquarium".to_string(), vec!["fish@example.com".to_string()]),
            ("webgl".to_string(), vec!["webgl@example.com".to_string()]),
            ("gtest".to_string(), vec!["gtest@example.com".to_string()]),
        ]),
        aquarium_average_fps: HashMap::from([(
            "linux".to_string(),
            HashMap::from([("d3d12".to_string(), 60.0), ("metal".to_string(), 60.0)]),
        )]),
        linux_jobs: vec![
            "webgl2_gl".to_string(),
            "webgl_gl".to_string(),
            "gtest_vulkan".to_string(),
            "aquarium_d3d12".to_string(),
        ],
        try_job_target: HashMap::from([
            ("webgl2_gl".to_string(), TargetSpec::new("webgl2", "gl")),
            ("webgl_gl".to_string(), TargetSpec::new("webgl", "gl")),
            ("gtest_vulkan".to_string(), TargetSpec::new("gtest", "vulkan")),
            (
                "aquarium_d3d12".to_string(),
                TargetSpec::new("aquarium", "d3d12"),
            ),
        ]),
        try_job_shards: HashMap::from([("webgl2_gl".to_string(), 4), ("webgl2".to_string(), 2)]),
        ..TryJobDocument::default()
    }
}

fn config(report_dir: &Path, build: bool, email: bool) -> RunConfig {
    let options = RunOptions {
        chrome_dir: Some(PathBuf::from("/work/chromium")),
        aquarium_dir: Some(PathBuf::from("/work/aquarium")),
        build,
        email,
        report_dir: Some(report_dir.to_path_buf()),
        ..RunOptions::default()
    };
    RunConfig::resolve(options, document(), Os::Linux).expect("valid config")
}

fn facts(dir: &Path) -> HostFacts {
    HostFacts::new("gpu-bot-7", Os::Linux, dir.to_path_buf())
}

fn orchestrator(runner: Arc<ScriptedRunner>, mailer: Arc<MemoryMailer>) -> TryJobOrchestrator {
    TryJobOrchestrator::new(runner, mailer, "gpu-bot-7")
}

fn scripted_reports() -> ScriptedRunner {
    ScriptedRunner::new()
        .respond("git -C /work/chromium", "c0ffee\n")
        .respond("git -C /work/aquarium", "f15h\n")
        .respond("parse_result webgl", "conformance [New Fail:2]\nextensions [New Pass:1]\n")
        .respond("parse_result gtest", "gpu_unittests [New Pass:5]\n")
        .respond(
            "parse_result aquarium",
            "aquarium_d3d12_test 58\naquarium_metal_test 60",
        )
}

/// Test: every job passes and one report per category is written and mailed
#[tokio::test]
async fn test_full_run_publishes_reports() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(scripted_reports());
    let mailer = Arc::new(MemoryMailer::new());
    let cfg = config(dir.path(), true, true);

    let summary = orchestrator(runner.clone(), mailer.clone())
        .run(&cfg, facts(dir.path()))
        .await
        .expect("run should succeed");

    assert_eq!(summary.passed_jobs(), 4);
    assert_eq!(summary.failed_jobs(), 0);
    assert_eq!(summary.facts.chrome_revision.as_deref(), Some("c0ffee"));
    assert_eq!(summary.facts.aquarium_revision.as_deref(), Some("f15h"));

    let calls: Vec<String> = runner.calls().iter().map(|c| c.join(" ")).collect();
    assert!(calls[0].starts_with("build_project chrome --type release --dir /work/chromium"));
    assert!(calls.iter().any(|c| c.starts_with("build_project aquarium")));
    assert!(calls
        .iter()
        .any(|c| c.starts_with("run_gpu_test webgl2 --backend gl") && c.ends_with("--shard 4")));

    // webgl and webgl2 share one report
    let titles: Vec<&str> = summary
        .reports
        .iter()
        .map(|p| p.report.title.as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "WebGL Test Report - Linux / gpu-bot-7 - [New Fail:2] [New Pass:1]",
            "GTest Report - Linux / gpu-bot-7 - All Clear",
            "Aquarium Test Report - Linux / gpu-bot-7 - [Max Bias:-3%]",
        ]
    );

    for name in [
        "webgl_test_report.txt",
        "gtest_report.txt",
        "aquarium_test_report.txt",
    ] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }
    let aquarium = std::fs::read_to_string(dir.path().join("aquarium_test_report.txt")).unwrap();
    assert!(aquarium.contains("Revision: f15h"));
    assert!(aquarium.contains("aquarium_d3d12_test 58 (-3%)"));
    assert!(aquarium.contains("aquarium_metal_test 60 (+0%)"));

    let sent = mailer.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].to, vec!["webgl@example.com".to_string()]);
    assert_eq!(sent[2].to, vec!["fish@example.com".to_string()]);
    assert!(summary.reports.iter().all(|r| r.emailed));
}

/// Test: a failed chrome build notifies admin and runs no job
#[tokio::test]
async fn test_chrome_build_failure_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().fail("build_project chrome", 1, "ninja: error"));
    let mailer = Arc::new(MemoryMailer::new());
    let cfg = config(dir.path(), true, true);

    let err = orchestrator(runner.clone(), mailer.clone())
        .run(&cfg, facts(dir.path()))
        .await
        .unwrap_err();

    match err {
        TryJobError::Build(failure) => {
            assert_eq!(failure.project, Project::Chrome);
            assert_eq!(failure.failure.output, "ninja: error");
        }
        other => panic!("expected build failure, got {other:?}"),
    }
    assert!(!runner.ran("run_gpu_test"));
    assert!(!runner.ran("build_project aquarium"));

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["admin@example.com".to_string()]);
    assert_eq!(sent[0].subject, "build_project chrome failed on gpu-bot-7");
    assert!(sent[0].body.ends_with("ninja: error"));
}

/// Test: a failed aquarium build only drops the aquarium jobs
#[tokio::test]
async fn test_aquarium_build_failure_skips_aquarium_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("build_project aquarium", 2, "dawn mismatch")
            .respond("parse_result webgl", "all good\n")
            .respond("parse_result gtest", "all good\n"),
    );
    let mailer = Arc::new(MemoryMailer::new());
    let cfg = config(dir.path(), true, false);

    let summary = orchestrator(runner.clone(), mailer.clone())
        .run(&cfg, facts(dir.path()))
        .await
        .expect("aquarium failure is not fatal");

    assert!(summary.build_status.aquarium_failed);
    assert!(!summary.build_status.chrome_failed);
    assert_eq!(summary.jobs.skipped, vec!["aquarium_d3d12".to_string()]);
    assert_eq!(summary.passed_jobs(), 3);
    assert!(!runner.ran("run_gpu_test aquarium"));
    assert!(!runner.ran("parse_result aquarium"));

    // Only the build failure is mailed; reports stay local without --email.
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["fish@example.com".to_string()]);
    assert_eq!(summary.reports.len(), 2);
    assert!(summary.reports.iter().all(|r| !r.emailed));
}

/// Test: job and extraction failures are isolated
#[tokio::test]
async fn test_job_and_parse_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("run_gpu_test gtest", 1, "gpu_unittests crashed")
            .fail("parse_result webgl", 3, "no results directory")
            .respond("parse_result aquarium", "aquarium_metal_test 60\n"),
    );
    let mailer = Arc::new(MemoryMailer::new());
    let cfg = config(dir.path(), false, false);

    let summary = orchestrator(runner.clone(), mailer.clone())
        .run(&cfg, facts(dir.path()))
        .await
        .expect("run should succeed");

    assert!(!runner.ran("build_project"));
    assert_eq!(summary.failed_jobs(), 1);
    assert_eq!(summary.passed_jobs(), 3);
    assert!(!runner.ran("parse_result gtest"));

    let sent = mailer.sent();
    let admin = vec!["admin@example.com".to_string()];
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, admin);
    assert_eq!(sent[1].to, admin);
    let subjects: Vec<String> = sent.into_iter().map(|m| m.subject).collect();
    assert_eq!(
        subjects,
        vec![
            "run_gpu_test gtest failed on gpu-bot-7".to_string(),
            "parse_result webgl failed on gpu-bot-7".to_string(),
        ]
    );

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(
        summary.reports[0].report.title,
        "Aquarium Test Report - Linux / gpu-bot-7 - No Bias"
    );
    assert!(!dir.path().join("webgl_test_report.txt").exists());
}

/// Test: an empty extracted report produces no file
#[tokio::test]
async fn test_empty_report_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().respond("parse_result webgl", "\n  \n"));
    let mailer = Arc::new(MemoryMailer::new());
    let cfg = config(dir.path(), false, true);

    let summary = orchestrator(runner, mailer.clone())
        .run(&cfg, facts(dir.path()))
        .await
        .expect("run should succeed");

    assert!(summary
        .reports
        .iter()
        .all(|r| r.report.category.as_str() != "webgl"));
    assert!(!dir.path().join("webgl_test_report.txt").exists());
    assert!(mailer.sent().is_empty());
}
