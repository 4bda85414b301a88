//! Loading of the trained transform and classifier artifacts
//!
//! Both artifacts are produced offline and read once at startup. Optional
//! SHA256 checksums are verified before parsing. Any problem here is fatal
//! for the process: the gate never runs with a partial or mismatched pair.

use super::svm::OneClassSvm;
use super::transform::FeatureTransform;
use super::{AnomalyGate, Classifier};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read artifact {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Failed to parse artifact {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Incompatible artifact: {0}")]
    Incompatible(String),
}

/// Location of one artifact plus its expected checksum, if pinned
#[derive(Debug, Clone)]
pub struct ArtifactSource {
    pub path: PathBuf,
    pub sha256: Option<String>,
}

impl ArtifactSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }
}

/// Classifier artifacts, tagged by `kind`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    OneClassSvm(OneClassSvm),
}

impl ClassifierArtifact {
    pub fn validate(&self) -> Result<(), ArtifactError> {
        match self {
            ClassifierArtifact::OneClassSvm(svm) => svm.validate(),
        }
    }

    pub fn into_classifier(self) -> Arc<dyn Classifier> {
        match self {
            ClassifierArtifact::OneClassSvm(svm) => Arc::new(svm),
        }
    }
}

/// Read, verify and parse the transform artifact
pub fn load_transform(source: &ArtifactSource) -> Result<FeatureTransform, ArtifactError> {
    let bytes = read_verified(source)?;
    let transform: FeatureTransform =
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Parse {
            path: source.path.clone(),
            source: e,
        })?;
    transform.validate()?;
    Ok(transform)
}

/// Read, verify and parse the classifier artifact
pub fn load_classifier(source: &ArtifactSource) -> Result<ClassifierArtifact, ArtifactError> {
    let bytes = read_verified(source)?;
    let classifier: ClassifierArtifact =
        serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Parse {
            path: source.path.clone(),
            source: e,
        })?;
    classifier.validate()?;
    Ok(classifier)
}

/// Load both artifacts and assemble the gate
pub fn load_gate(
    transform: &ArtifactSource,
    classifier: &ArtifactSource,
    threshold: f64,
) -> Result<AnomalyGate, ArtifactError> {
    let transform = load_transform(transform)?;
    let classifier = load_classifier(classifier)?.into_classifier();

    let gate = AnomalyGate::new(Arc::new(transform), classifier, threshold)?;
    info!(
        transform_version = %gate.transform_version(),
        classifier_version = %gate.classifier_version(),
        threshold = threshold,
        "Anomaly gate artifacts loaded"
    );
    Ok(gate)
}

fn read_verified(source: &ArtifactSource) -> Result<Vec<u8>, ArtifactError> {
    let bytes = read_artifact(&source.path)?;
    if let Some(expected) = &source.sha256 {
        let actual = compute_checksum(&bytes);
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(ArtifactError::Checksum {
                path: source.path.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }
    Ok(bytes)
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    fs::read(path).map_err(|e| ArtifactError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
