//! Archive to batch report
//!
//! One submission flows through extract, locate, then per chart: features,
//! gate, deploy. Only archive-level failures abort the request; everything
//! that goes wrong for a single chart becomes that chart's outcome.

use crate::archive::{self, ArchiveError, ArchiveKind, ScratchDir, DEFAULT_MAX_EXTRACTED_BYTES};
use crate::charts::{locate_charts, FeatureExtractor, CHART_DESCRIPTOR, VALUES_DESCRIPTOR};
use crate::deploy::DeploymentExecutor;
use crate::gate::AnomalyGate;
use crate::models::{BatchReport, ChartCandidate, ChartOutcome, GateVerdict};
use crate::observability::{GatekeeperMetrics, StructuredLogger};
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GatekeeperError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to prepare scratch directory: {0}")]
    Io(#[from] io::Error),

    #[error("Extraction task failed: {0}")]
    Task(String),
}

impl GatekeeperError {
    pub fn is_format_error(&self) -> bool {
        matches!(self, GatekeeperError::Archive(e) if e.is_format_error())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent for scratch directories; the OS temp dir when unset
    pub scratch_root: Option<PathBuf>,
    pub max_extracted_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }
}

/// The deployment gatekeeper. Cheap to clone; clones share the gate,
/// the executor and its release locks.
#[derive(Clone)]
pub struct Gatekeeper {
    config: PipelineConfig,
    extractor: FeatureExtractor,
    gate: AnomalyGate,
    executor: DeploymentExecutor,
    metrics: GatekeeperMetrics,
    logger: StructuredLogger,
}

impl Gatekeeper {
    pub fn new(
        config: PipelineConfig,
        gate: AnomalyGate,
        executor: DeploymentExecutor,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
            gate,
            executor,
            metrics: GatekeeperMetrics::new(),
            logger,
        }
    }

    pub fn gate(&self) -> &AnomalyGate {
        &self.gate
    }

    pub fn executor(&self) -> &DeploymentExecutor {
        &self.executor
    }

    /// Process one uploaded archive.
    ///
    /// The scratch directory is removed before this returns, whatever the
    /// outcome.
    pub async fn process_archive(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<BatchReport, GatekeeperError> {
        self.metrics.inc_archives_received();
        self.logger.log_archive_received(filename, bytes.len());

        let result = self.run(filename, bytes).await;
        match &result {
            Ok(report) => self.logger.log_batch_complete(filename, report),
            Err(e) => {
                self.metrics.inc_archives_rejected();
                self.logger.log_archive_rejected(filename, &e.to_string());
            }
        }
        result
    }

    async fn run(&self, filename: &str, bytes: Vec<u8>) -> Result<BatchReport, GatekeeperError> {
        let kind = ArchiveKind::from_filename(filename)?;
        let scratch = ScratchDir::allocate(self.config.scratch_root.as_deref())?;
        let root_release = kind.stem(filename).to_string();
        let max_bytes = self.config.max_extracted_bytes;

        // Owned by the blocking task while it writes; a cancelled request must
        // not remove the tree underneath a running extraction.
        let (scratch, candidates) = tokio::task::spawn_blocking(move || {
            let located = archive::extract_archive(kind, &bytes, scratch.path(), max_bytes)
                .and_then(|()| locate_charts(scratch.path(), &root_release).map_err(ArchiveError::Io));
            match located {
                Ok(candidates) => Ok((scratch, candidates)),
                Err(e) => {
                    close_scratch(scratch);
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| GatekeeperError::Task(e.to_string()))??;

        debug!(filename = %filename, charts = candidates.len(), "Processing chart candidates");

        let mut report = BatchReport::default();
        for candidate in &candidates {
            let outcome = self.process_chart(candidate).await;
            self.metrics.record_outcome(outcome.status);
            self.logger.log_chart_outcome(&outcome);
            report.deployments.push(outcome);
        }

        close_scratch(scratch);
        Ok(report)
    }

    async fn process_chart(&self, candidate: &ChartCandidate) -> ChartOutcome {
        if !candidate.has_chart_descriptor {
            return ChartOutcome::extraction_error(
                candidate,
                format!("missing {}", CHART_DESCRIPTOR),
            );
        }
        if candidate.release_name.trim().is_empty() {
            return ChartOutcome::extraction_error(
                candidate,
                "cannot derive a release name for this chart",
            );
        }

        let values_path = candidate.path.join(VALUES_DESCRIPTOR);
        let values = match tokio::fs::read_to_string(&values_path).await {
            Ok(values) => values,
            Err(e) => {
                return ChartOutcome::extraction_error(
                    candidate,
                    format!("failed to read {}: {}", VALUES_DESCRIPTOR, e),
                )
            }
        };

        let features = match self.extractor.extract(&values) {
            Ok(features) => features,
            Err(e) => return ChartOutcome::extraction_error(candidate, e.to_string()),
        };

        let start = Instant::now();
        let evaluation = self.gate.evaluate(&features);
        self.metrics
            .observe_gate_latency(start.elapsed().as_secs_f64());

        let evaluation = match evaluation {
            Ok(evaluation) => evaluation,
            Err(e) => return ChartOutcome::gate_error(candidate, features, e.to_string()),
        };

        if evaluation.verdict == GateVerdict::Anomalous {
            return ChartOutcome::skipped_anomalous(candidate, features, evaluation.score);
        }

        match self.executor.deploy(candidate).await {
            Ok(output) => ChartOutcome::deployed(candidate, features, evaluation.score, output.stdout),
            Err(e) => {
                let log = e.captured_log().map(str::to_string);
                ChartOutcome::deployment_error(candidate, features, evaluation.score, log, e.to_string())
            }
        }
    }
}

fn close_scratch(scratch: ScratchDir) {
    let path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
    }
}
