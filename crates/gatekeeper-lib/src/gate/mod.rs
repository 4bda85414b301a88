//! Anomaly gate
//!
//! Scores a chart's feature record against the learned baseline and maps the
//! raw score to a binary verdict. The gate holds only immutable, shared
//! artifacts, so evaluations are pure and may run concurrently.

mod artifacts;
mod svm;
mod transform;

pub use artifacts::{
    compute_checksum, load_classifier, load_gate, load_transform, ArtifactError, ArtifactSource,
    ClassifierArtifact,
};
pub use svm::OneClassSvm;
pub use transform::{
    CategoricalEncoding, FeatureTransform, NumericScaling, CATEGORICAL_COLUMN, NUMERIC_COLUMNS,
};

use crate::models::{FeatureRecord, GateVerdict};
use std::sync::Arc;
use thiserror::Error;

/// Scores at or above this value are `normal`, below it `anomalous`.
///
/// Matches the one-class SVM convention where the decision function is
/// positive inside the learned support and negative outside it.
pub const DEFAULT_DECISION_THRESHOLD: f64 = 0.0;

/// Trait for trained classifiers producing a raw decision score
pub trait Classifier: Send + Sync {
    /// Length of the input vector the model was fitted on
    fn input_len(&self) -> usize;

    /// Raw decision score for a transformed feature vector
    fn decision_score(&self, input: &[f64]) -> f64;

    fn version(&self) -> &str;
}

/// Per-chart gate failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GateError {
    #[error("Workload category '{0}' is not in the trained vocabulary")]
    UnseenCategory(String),

    #[error("Transformed vector has {actual} values, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Classifier produced a non-finite score ({0})")]
    NonFiniteScore(f64),
}

/// Result of scoring one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateEvaluation {
    pub verdict: GateVerdict,
    pub score: f64,
}

/// Map a raw score to a verdict
pub fn verdict_for(score: f64, threshold: f64) -> GateVerdict {
    if score >= threshold {
        GateVerdict::Normal
    } else {
        GateVerdict::Anomalous
    }
}

/// The transform + classifier pair, loaded once and shared read-only
#[derive(Clone)]
pub struct AnomalyGate {
    transform: Arc<FeatureTransform>,
    classifier: Arc<dyn Classifier>,
    threshold: f64,
}

impl std::fmt::Debug for AnomalyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyGate")
            .field("transform_version", &self.transform.version)
            .field("classifier_version", &self.classifier.version())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl AnomalyGate {
    /// Pair a transform with a classifier, rejecting incompatible shapes
    pub fn new(
        transform: Arc<FeatureTransform>,
        classifier: Arc<dyn Classifier>,
        threshold: f64,
    ) -> Result<Self, ArtifactError> {
        if transform.output_len() != classifier.input_len() {
            return Err(ArtifactError::Incompatible(format!(
                "transform produces {} values but classifier expects {}",
                transform.output_len(),
                classifier.input_len()
            )));
        }
        if !threshold.is_finite() {
            return Err(ArtifactError::Incompatible(format!(
                "decision threshold {} is not finite",
                threshold
            )));
        }
        Ok(Self {
            transform,
            classifier,
            threshold,
        })
    }

    pub fn evaluate(&self, record: &FeatureRecord) -> Result<GateEvaluation, GateError> {
        let input = self.transform.apply(record)?;
        let expected = self.classifier.input_len();
        if input.len() != expected {
            return Err(GateError::DimensionMismatch {
                expected,
                actual: input.len(),
            });
        }

        let score = self.classifier.decision_score(&input);
        if !score.is_finite() {
            return Err(GateError::NonFiniteScore(score));
        }

        Ok(GateEvaluation {
            verdict: verdict_for(score, self.threshold),
            score,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn transform_version(&self) -> &str {
        &self.transform.version
    }

    pub fn classifier_version(&self) -> &str {
        self.classifier.version()
    }
}
