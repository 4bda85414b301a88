//! End-to-end archive processing against a recording release tool

use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use gatekeeper_lib::gate::{load_gate, ArtifactSource};
use gatekeeper_lib::{
    DeploymentExecutor, Gatekeeper, GatekeeperError, OutcomeStatus, PipelineConfig, ReleaseTool,
    StructuredLogger, ToolError, ToolOutput, WorkloadType, DEFAULT_DECISION_THRESHOLD,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const CHART_YAML: &str = "apiVersion: v2\nname: demo\nversion: 0.1.0\n";

fn values(app: &str, replicas: u32, cpu: i64, memory: i64) -> String {
    format!(
        "replicaCount: {}\nnamespace:\n  app: {}\nresources:\n  limits:\n    cpu: {}\n    memory: {}\n",
        replicas, app, cpu, memory
    )
}

fn baseline_values(app: &str) -> String {
    values(app, 1, 100, 256)
}

/// Records every call; installs of releases listed in `failing` exit nonzero
#[derive(Default)]
struct RecordingTool {
    calls: Mutex<Vec<(String, PathBuf, Vec<String>)>>,
    failing: Vec<String>,
}

impl RecordingTool {
    fn failing(releases: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: releases.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn installed(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(release, _, _)| release.clone())
            .collect()
    }
}

#[async_trait]
impl ReleaseTool for RecordingTool {
    async fn install_or_upgrade(
        &self,
        release: &str,
        chart_path: &Path,
        overrides: &[String],
    ) -> Result<ToolOutput, ToolError> {
        // The chart must still be on disk while the tool runs
        assert!(chart_path.join("Chart.yaml").is_file());
        self.calls.lock().unwrap().push((
            release.to_string(),
            chart_path.to_path_buf(),
            overrides.to_vec(),
        ));
        if self.failing.iter().any(|r| r == release) {
            return Err(ToolError::NonZeroExit {
                code: Some(1),
                stderr: format!("Error: UPGRADE FAILED: {} is broken", release),
            });
        }
        Ok(ToolOutput {
            stdout: format!("Release \"{}\" has been upgraded. Happy Helming!", release),
            stderr: String::new(),
        })
    }

    async fn uninstall(&self, _release: &str) -> Result<ToolOutput, ToolError> {
        unreachable!("the pipeline never uninstalls")
    }

    async fn status(&self, _release: &str) -> Result<ToolOutput, ToolError> {
        unreachable!("the pipeline never queries status")
    }

    async fn probe(&self) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::default())
    }
}

struct Harness {
    gatekeeper: Gatekeeper,
    tool: Arc<RecordingTool>,
    scratch_root: TempDir,
}

impl Harness {
    fn new(tool: RecordingTool) -> Self {
        let artifacts = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../artifacts");
        let gate = load_gate(
            &ArtifactSource::new(artifacts.join("transform.json")),
            &ArtifactSource::new(artifacts.join("classifier.json")),
            DEFAULT_DECISION_THRESHOLD,
        )
        .unwrap();

        let tool = Arc::new(tool);
        let executor =
            DeploymentExecutor::new(tool.clone(), vec!["image.pullPolicy=Never".to_string()]);
        let scratch_root = TempDir::new().unwrap();
        let config = PipelineConfig {
            scratch_root: Some(scratch_root.path().to_path_buf()),
            ..PipelineConfig::default()
        };

        Self {
            gatekeeper: Gatekeeper::new(config, gate, executor, StructuredLogger::new("test")),
            tool,
            scratch_root,
        }
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch_root.path())
            .unwrap()
            .next()
            .is_none()
    }
}

fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn tgz_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test]
async fn test_scenario_baseline_chart_is_deployed() {
    let harness = Harness::new(RecordingTool::default());
    let values = baseline_values("COMPRESSOR");
    let archive = zip_archive(&[
        ("compressor/Chart.yaml", CHART_YAML),
        ("compressor/values.yaml", &values),
    ]);

    let report = harness
        .gatekeeper
        .process_archive("bundle.zip", archive)
        .await
        .unwrap();

    assert_eq!(report.deployments.len(), 1);
    let outcome = &report.deployments[0];
    assert_eq!(outcome.chart, "compressor");
    assert_eq!(outcome.status, OutcomeStatus::Deployed);
    assert!(outcome.score.unwrap() >= DEFAULT_DECISION_THRESHOLD);
    assert!(outcome.log.as_deref().unwrap().contains("Happy Helming"));

    let features = outcome.features.unwrap();
    assert_eq!(features.workload_type, WorkloadType::Compressor);
    assert_eq!(features.replica_count, 1);

    let calls = harness.tool.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "compressor");
    assert_eq!(calls[0].2, vec!["image.pullPolicy=Never".to_string()]);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_scenario_far_replicas_skipped_without_tool_call() {
    let harness = Harness::new(RecordingTool::default());
    let values = values("COMPRESSOR", 50, 100, 256);
    let archive = tgz_archive(&[
        ("compressor/Chart.yaml", CHART_YAML),
        ("compressor/values.yaml", &values),
    ]);

    let report = harness
        .gatekeeper
        .process_archive("bundle.tgz", archive)
        .await
        .unwrap();

    assert_eq!(report.deployments.len(), 1);
    assert_eq!(report.deployments[0].status, OutcomeStatus::SkippedAnomalous);
    assert!(report.deployments[0].score.unwrap() < DEFAULT_DECISION_THRESHOLD);
    assert!(harness.tool.installed().is_empty());
}

#[tokio::test]
async fn test_scenario_unknown_workload_is_extraction_error() {
    let harness = Harness::new(RecordingTool::default());
    let values = baseline_values("ROUTER");
    let archive = zip_archive(&[
        ("router/Chart.yaml", CHART_YAML),
        ("router/values.yaml", &values),
    ]);

    let report = harness
        .gatekeeper
        .process_archive("bundle.zip", archive)
        .await
        .unwrap();

    let outcome = &report.deployments[0];
    assert_eq!(outcome.status, OutcomeStatus::ExtractionError);
    assert!(outcome.error.as_deref().unwrap().contains("ROUTER"));
    assert!(outcome.features.is_none());
    assert!(outcome.score.is_none());
    assert!(harness.tool.installed().is_empty());
}

#[tokio::test]
async fn test_mixed_archive_reports_every_chart_in_order() {
    let harness = Harness::new(RecordingTool::failing(&["grayscaler"]));
    let compressor = baseline_values("compressor");
    let grayscaler = baseline_values("grayscaler");
    let heavy = values("compressor", 1, 4000, 256);
    let router = baseline_values("router");

    let archive = tgz_archive(&[
        ("apps/zeta/Chart.yaml", CHART_YAML),
        ("apps/zeta/values.yaml", &compressor),
        ("apps/grayscaler/Chart.yaml", CHART_YAML),
        ("apps/grayscaler/values.yaml", &grayscaler),
        ("apps/heavy/Chart.yaml", CHART_YAML),
        ("apps/heavy/values.yaml", &heavy),
        ("apps/router/Chart.yaml", CHART_YAML),
        ("apps/router/values.yaml", &router),
        ("apps/orphan/values.yaml", &compressor),
        ("apps/no-values/Chart.yaml", CHART_YAML),
    ]);

    let report = harness
        .gatekeeper
        .process_archive("platform.tar.gz", archive)
        .await
        .unwrap();

    let summary: Vec<(&str, OutcomeStatus)> = report
        .deployments
        .iter()
        .map(|o| (o.chart_path.as_str(), o.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("apps/grayscaler", OutcomeStatus::DeploymentError),
            ("apps/heavy", OutcomeStatus::SkippedAnomalous),
            ("apps/orphan", OutcomeStatus::ExtractionError),
            ("apps/router", OutcomeStatus::ExtractionError),
            ("apps/zeta", OutcomeStatus::Deployed),
        ]
    );

    let failed = &report.deployments[0];
    assert!(failed.log.as_deref().unwrap().contains("UPGRADE FAILED"));
    assert!(failed.error.is_some());

    let orphan = &report.deployments[2];
    assert!(orphan.error.as_deref().unwrap().contains("Chart.yaml"));

    assert_eq!(harness.tool.installed(), vec!["grayscaler", "zeta"]);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_chart_at_archive_root_uses_archive_name() {
    let harness = Harness::new(RecordingTool::default());
    let values = baseline_values("grayscaler");
    let archive = zip_archive(&[("Chart.yaml", CHART_YAML), ("values.yaml", &values)]);

    let report = harness
        .gatekeeper
        .process_archive("uploads/grayscale-svc.ZIP", archive)
        .await
        .unwrap();

    assert_eq!(report.deployments[0].chart, "grayscale-svc");
    assert_eq!(report.deployments[0].chart_path, ".");
    assert_eq!(report.deployments[0].status, OutcomeStatus::Deployed);
}

#[tokio::test]
async fn test_archive_without_charts_is_empty_report() {
    let harness = Harness::new(RecordingTool::default());
    let archive = zip_archive(&[("README.md", "nothing to see")]);

    let report = harness
        .gatekeeper
        .process_archive("empty.zip", archive)
        .await
        .unwrap();
    assert!(report.deployments.is_empty());
}

#[tokio::test]
async fn test_unsupported_format_rejected_before_scratch() {
    let harness = Harness::new(RecordingTool::default());
    let err = harness
        .gatekeeper
        .process_archive("bundle.rar", vec![1, 2, 3])
        .await
        .unwrap_err();

    assert!(err.is_format_error());
    assert!(err.to_string().contains("bundle.rar"));
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn test_failed_extraction_cleans_scratch() {
    let harness = Harness::new(RecordingTool::default());

    let err = harness
        .gatekeeper
        .process_archive("broken.tgz", b"definitely not gzip".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Archive(_)));
    assert!(!err.is_format_error());
    assert!(harness.scratch_is_empty());

    let archive = zip_archive(&[("../escape/values.yaml", "replicaCount: 1")]);
    let err = harness
        .gatekeeper
        .process_archive("evil.zip", archive)
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Archive(_)));
    assert!(harness.scratch_is_empty());
    assert!(harness.tool.installed().is_empty());
}

#[tokio::test]
async fn test_root_chart_without_derivable_name_is_not_deployed() {
    let harness = Harness::new(RecordingTool::default());
    let values = baseline_values("compressor");
    let archive = tgz_archive(&[("Chart.yaml", CHART_YAML), ("values.yaml", &values)]);

    let report = harness
        .gatekeeper
        .process_archive(".tgz", archive)
        .await
        .unwrap();

    assert_eq!(report.deployments.len(), 1);
    let outcome = &report.deployments[0];
    assert_eq!(outcome.status, OutcomeStatus::ExtractionError);
    assert!(outcome.error.as_deref().unwrap().contains("release name"));
    assert!(harness.tool.installed().is_empty());
}

/// Many large, highly compressible files so extraction takes a while
fn bulky_tgz(files: usize, file_size: usize) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    let data = vec![0u8; file_size];
    for i in 0..files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("bulk/blob-{}.bin", i), data.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test]
async fn test_cancelled_request_leaves_no_scratch_behind() {
    let harness = Harness::new(RecordingTool::default());
    let archive = bulky_tgz(64, 1024 * 1024);

    let _ = tokio::time::timeout(
        Duration::from_millis(1),
        harness.gatekeeper.process_archive("bulk.tgz", archive),
    )
    .await;

    // Extraction keeps running on the blocking pool after the request is gone
    let mut empty = false;
    for _ in 0..200 {
        if harness.scratch_is_empty() {
            empty = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(empty, "scratch directory outlived the cancelled request");
    assert!(harness.tool.installed().is_empty());
}
