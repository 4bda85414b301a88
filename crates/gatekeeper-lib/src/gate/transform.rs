//! Feature transform artifact
//!
//! Mirrors the preprocessing fitted at training time: numeric columns are
//! standardized with the training mean and scale, the workload column is
//! one-hot encoded against the training vocabulary. The output vector is the
//! numeric block followed by the one-hot block.

use super::{ArtifactError, GateError};
use crate::models::{FeatureRecord, WorkloadType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Numeric columns, in the order the classifier expects them
pub const NUMERIC_COLUMNS: [&str; 3] = ["replica_count", "cpu_limit", "memory_limit"];

/// The single categorical column
pub const CATEGORICAL_COLUMN: &str = "workload_type";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaling {
    pub column: String,
    pub mean: f64,
    /// Standard deviation at training time; zero-variance columns export 1.0
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoding {
    pub column: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    #[serde(default)]
    pub version: String,
    pub numeric: Vec<NumericScaling>,
    pub categorical: CategoricalEncoding,
}

impl FeatureTransform {
    /// Check the artifact against the feature layout this build produces
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let columns: Vec<&str> = self.numeric.iter().map(|n| n.column.as_str()).collect();
        if columns != NUMERIC_COLUMNS {
            return Err(ArtifactError::Incompatible(format!(
                "numeric columns {:?} do not match {:?}",
                columns, NUMERIC_COLUMNS
            )));
        }

        for scaling in &self.numeric {
            if !scaling.mean.is_finite() || !scaling.scale.is_finite() || scaling.scale == 0.0 {
                return Err(ArtifactError::Incompatible(format!(
                    "column '{}' has unusable mean {} / scale {}",
                    scaling.column, scaling.mean, scaling.scale
                )));
            }
        }

        if self.categorical.column != CATEGORICAL_COLUMN {
            return Err(ArtifactError::Incompatible(format!(
                "categorical column '{}' is not '{}'",
                self.categorical.column, CATEGORICAL_COLUMN
            )));
        }

        if self.categorical.categories.is_empty() {
            return Err(ArtifactError::Incompatible(
                "categorical vocabulary is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for category in &self.categorical.categories {
            if category.parse::<WorkloadType>().is_err() {
                return Err(ArtifactError::Incompatible(format!(
                    "category '{}' is not a known workload type",
                    category
                )));
            }
            if !seen.insert(category.as_str()) {
                return Err(ArtifactError::Incompatible(format!(
                    "category '{}' appears twice",
                    category
                )));
            }
        }

        Ok(())
    }

    /// Length of the vector produced by [`FeatureTransform::apply`]
    pub fn output_len(&self) -> usize {
        self.numeric.len() + self.categorical.categories.len()
    }

    pub fn apply(&self, record: &FeatureRecord) -> Result<Vec<f64>, GateError> {
        let category = record.workload_type.as_str();
        let hot = self
            .categorical
            .categories
            .iter()
            .position(|c| c == category)
            .ok_or_else(|| GateError::UnseenCategory(category.to_string()))?;

        let raw = [
            record.replica_count as f64,
            record.cpu_limit as f64,
            record.memory_limit as f64,
        ];

        let mut vector = Vec::with_capacity(self.output_len());
        vector.extend(
            raw.iter()
                .zip(&self.numeric)
                .map(|(value, scaling)| (value - scaling.mean) / scaling.scale),
        );
        vector.extend((0..self.categorical.categories.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> FeatureTransform {
        serde_json::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../artifacts/transform.json"
        )))
        .unwrap()
    }

    fn record(workload_type: WorkloadType, replicas: u32) -> FeatureRecord {
        FeatureRecord {
            workload_type,
            replica_count: replicas,
            cpu_limit: 100,
            memory_limit: 256,
        }
    }

    #[test]
    fn test_baseline_transform_is_valid() {
        let t = transform();
        t.validate().unwrap();
        assert_eq!(t.output_len(), 5);
    }

    #[test]
    fn test_apply_standardizes_and_encodes() {
        let t = transform();

        let v = t.apply(&record(WorkloadType::Compressor, 1)).unwrap();
        assert_eq!(v, vec![0.0, 0.0, 0.0, 1.0, 0.0]);

        let v = t.apply(&record(WorkloadType::Grayscaler, 50)).unwrap();
        assert_eq!(v, vec![49.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_apply_uses_scale() {
        let mut t = transform();
        t.numeric[2].scale = 2.0;
        let v = t
            .apply(&FeatureRecord {
                workload_type: WorkloadType::Compressor,
                replica_count: 1,
                cpu_limit: 100,
                memory_limit: 260,
            })
            .unwrap();
        assert_eq!(v[2], 2.0);
    }

    #[test]
    fn test_unseen_category_is_explicit_error() {
        let mut t = transform();
        t.categorical.categories = vec!["COMPRESSOR".to_string()];
        t.validate().unwrap();

        let err = t.apply(&record(WorkloadType::Grayscaler, 1)).unwrap_err();
        assert_eq!(err, GateError::UnseenCategory("GRAYSCALER".to_string()));
    }

    #[test]
    fn test_validation_rejects_mismatched_layouts() {
        let mut t = transform();
        t.numeric.swap(0, 1);
        assert!(matches!(t.validate(), Err(ArtifactError::Incompatible(_))));

        let mut t = transform();
        t.numeric[1].scale = 0.0;
        assert!(matches!(t.validate(), Err(ArtifactError::Incompatible(_))));

        let mut t = transform();
        t.categorical.categories.push("COMPRESSOR".to_string());
        assert!(matches!(t.validate(), Err(ArtifactError::Incompatible(_))));

        let mut t = transform();
        t.categorical.categories.push("ROUTER".to_string());
        assert!(matches!(t.validate(), Err(ArtifactError::Incompatible(_))));

        let mut t = transform();
        t.categorical.categories.clear();
        assert!(matches!(t.validate(), Err(ArtifactError::Incompatible(_))));
    }
}
