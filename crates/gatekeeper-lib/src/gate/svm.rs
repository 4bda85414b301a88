//! One-class SVM scoring with an RBF kernel
//!
//! `score(x) = sum_i dual_coef[i] * exp(-gamma * |x - sv_i|^2) + intercept`
//!
//! The parameters are exported from the fitted model (`intercept` is the
//! negated offset `rho`). Scores at or above the decision threshold sit
//! inside the learned boundary.

use super::{ArtifactError, Classifier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneClassSvm {
    #[serde(default)]
    pub version: String,
    pub gamma: f64,
    pub support_vectors: Vec<Vec<f64>>,
    pub dual_coef: Vec<f64>,
    pub intercept: f64,
}

impl OneClassSvm {
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(ArtifactError::Incompatible(format!(
                "gamma must be positive, got {}",
                self.gamma
            )));
        }
        let Some(first) = self.support_vectors.first() else {
            return Err(ArtifactError::Incompatible(
                "classifier has no support vectors".to_string(),
            ));
        };
        let dim = first.len();
        if self.support_vectors.iter().any(|sv| sv.len() != dim) {
            return Err(ArtifactError::Incompatible(
                "support vectors have differing lengths".to_string(),
            ));
        }
        if self.dual_coef.len() != self.support_vectors.len() {
            return Err(ArtifactError::Incompatible(format!(
                "{} dual coefficients for {} support vectors",
                self.dual_coef.len(),
                self.support_vectors.len()
            )));
        }
        let finite = self
            .support_vectors
            .iter()
            .flatten()
            .chain(&self.dual_coef)
            .all(|v| v.is_finite());
        if !finite || !self.intercept.is_finite() {
            return Err(ArtifactError::Incompatible(
                "classifier parameters contain non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        let squared: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
        (-self.gamma * squared).exp()
    }
}

impl Classifier for OneClassSvm {
    fn input_len(&self) -> usize {
        self.support_vectors.first().map(Vec::len).unwrap_or(0)
    }

    fn decision_score(&self, input: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * self.kernel(input, sv))
            .sum::<f64>()
            + self.intercept
    }

    fn version(&self) -> &str {
        &self.version
    }
}
