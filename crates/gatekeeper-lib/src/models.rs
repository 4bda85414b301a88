//! Core data models for the gatekeeper pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Workload kinds the anomaly baseline was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkloadType {
    Compressor,
    Grayscaler,
}

impl WorkloadType {
    pub const ALL: [WorkloadType; 2] = [WorkloadType::Compressor, WorkloadType::Grayscaler];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadType::Compressor => "COMPRESSOR",
            WorkloadType::Grayscaler => "GRAYSCALER",
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadType {
    type Err = ();

    /// Matches the canonical uppercase name only; callers uppercase first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkloadType::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or(())
    }
}

/// A directory in the scratch tree that looks like a chart root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartCandidate {
    /// Absolute path of the chart directory
    pub path: PathBuf,
    /// Path relative to the extraction root, `/`-separated (`.` for the root itself)
    pub relative_path: String,
    /// Release name used for install/upgrade
    pub release_name: String,
    pub has_chart_descriptor: bool,
    pub has_values_descriptor: bool,
}

impl ChartCandidate {
    pub fn is_complete(&self) -> bool {
        self.has_chart_descriptor && self.has_values_descriptor
    }
}

/// Canonical resource declaration of a chart, as consumed by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub workload_type: WorkloadType,
    pub replica_count: u32,
    pub cpu_limit: i64,
    pub memory_limit: i64,
}

/// Binary decision of the anomaly gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateVerdict {
    Normal,
    Anomalous,
}

/// Terminal state of one chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Deployed,
    SkippedAnomalous,
    ExtractionError,
    GateError,
    DeploymentError,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Deployed => "deployed",
            OutcomeStatus::SkippedAnomalous => "skipped_anomalous",
            OutcomeStatus::ExtractionError => "extraction_error",
            OutcomeStatus::GateError => "gate_error",
            OutcomeStatus::DeploymentError => "deployment_error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            OutcomeStatus::ExtractionError
                | OutcomeStatus::GateError
                | OutcomeStatus::DeploymentError
        )
    }
}

/// Per-chart result collected into the batch report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOutcome {
    pub chart: String,
    pub chart_path: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Captured output of the deployment tool, when it was invoked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChartOutcome {
    fn base(candidate: &ChartCandidate, status: OutcomeStatus) -> Self {
        Self {
            chart: candidate.release_name.clone(),
            chart_path: candidate.relative_path.clone(),
            status,
            features: None,
            score: None,
            log: None,
            error: None,
        }
    }

    pub fn extraction_error(candidate: &ChartCandidate, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(candidate, OutcomeStatus::ExtractionError)
        }
    }

    pub fn gate_error(
        candidate: &ChartCandidate,
        features: FeatureRecord,
        error: impl Into<String>,
    ) -> Self {
        Self {
            features: Some(features),
            error: Some(error.into()),
            ..Self::base(candidate, OutcomeStatus::GateError)
        }
    }

    pub fn skipped_anomalous(
        candidate: &ChartCandidate,
        features: FeatureRecord,
        score: f64,
    ) -> Self {
        Self {
            features: Some(features),
            score: Some(score),
            ..Self::base(candidate, OutcomeStatus::SkippedAnomalous)
        }
    }

    pub fn deployed(
        candidate: &ChartCandidate,
        features: FeatureRecord,
        score: f64,
        log: String,
    ) -> Self {
        Self {
            features: Some(features),
            score: Some(score),
            log: Some(log),
            ..Self::base(candidate, OutcomeStatus::Deployed)
        }
    }

    pub fn deployment_error(
        candidate: &ChartCandidate,
        features: FeatureRecord,
        score: f64,
        log: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            features: Some(features),
            score: Some(score),
            log,
            error: Some(error.into()),
            ..Self::base(candidate, OutcomeStatus::DeploymentError)
        }
    }
}

/// Response to one archive submission, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub deployments: Vec<ChartOutcome>,
}

impl BatchReport {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.deployments.iter().filter(|o| o.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> ChartCandidate {
        ChartCandidate {
            path: PathBuf::from("/tmp/scratch/compressor"),
            relative_path: "compressor".to_string(),
            release_name: "compressor".to_string(),
            has_chart_descriptor: true,
            has_values_descriptor: true,
        }
    }

    #[test]
    fn test_workload_type_parsing() {
        assert_eq!("COMPRESSOR".parse(), Ok(WorkloadType::Compressor));
        assert_eq!("GRAYSCALER".parse(), Ok(WorkloadType::Grayscaler));
        assert!("compressor".parse::<WorkloadType>().is_err());
        assert!("ROUTER".parse::<WorkloadType>().is_err());
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let features = FeatureRecord {
            workload_type: WorkloadType::Compressor,
            replica_count: 1,
            cpu_limit: 100,
            memory_limit: 256,
        };
        let outcome = ChartOutcome::skipped_anomalous(&candidate(), features, -0.5);
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["chart"], "compressor");
        assert_eq!(json["status"], "skipped_anomalous");
        assert_eq!(json["features"]["workload_type"], "COMPRESSOR");
        assert!(json.get("log").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_batch_report_counts() {
        let report = BatchReport {
            deployments: vec![
                ChartOutcome::extraction_error(&candidate(), "bad"),
                ChartOutcome::extraction_error(&candidate(), "worse"),
            ],
        };
        assert_eq!(report.count(OutcomeStatus::ExtractionError), 2);
        assert_eq!(report.count(OutcomeStatus::Deployed), 0);
        assert!(OutcomeStatus::ExtractionError.is_error());
        assert!(!OutcomeStatus::SkippedAnomalous.is_error());
    }
}
