//! Feature extraction from chart values
//!
//! Reads the resource declaration out of a chart's `values.yaml`:
//!
//! | feature          | source                    | default |
//! |------------------|---------------------------|---------|
//! | `workload_type`  | `namespace.app` (upper)   | -       |
//! | `replica_count`  | `replicaCount`            | 0       |
//! | `cpu_limit`      | `resources.limits.cpu`    | 0       |
//! | `memory_limit`   | `resources.limits.memory` | 0       |
//!
//! Numbers are taken at face value, in the same units the baseline was
//! trained on. Quantity strings such as `100m` are rejected.

use crate::models::{FeatureRecord, WorkloadType};
use serde_yaml::Value;
use thiserror::Error;

const WORKLOAD_PATH: &[&str] = &["namespace", "app"];
const REPLICA_PATH: &[&str] = &["replicaCount"];
const CPU_LIMIT_PATH: &[&str] = &["resources", "limits", "cpu"];
const MEMORY_LIMIT_PATH: &[&str] = &["resources", "limits", "memory"];

/// Per-chart extraction failures; each one becomes an `extraction_error` outcome
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("Unknown workload type '{0}'")]
    UnknownWorkload(String),

    #[error("Invalid value for '{field}': {reason}")]
    FeatureType { field: String, reason: String },

    #[error("Unreadable values descriptor: {0}")]
    Descriptor(String),
}

impl FeatureError {
    fn feature_type(path: &[&str], reason: impl Into<String>) -> Self {
        FeatureError::FeatureType {
            field: path.join("."),
            reason: reason.into(),
        }
    }
}

/// Turns values descriptors into feature records
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features from the text of a values descriptor
    pub fn extract(&self, values_yaml: &str) -> Result<FeatureRecord, FeatureError> {
        if values_yaml.trim().is_empty() {
            return self.extract_value(&Value::Null);
        }
        let document: Value = serde_yaml::from_str(values_yaml)
            .map_err(|e| FeatureError::Descriptor(e.to_string()))?;
        self.extract_value(&document)
    }

    /// Extract features from an already parsed document
    pub fn extract_value(&self, document: &Value) -> Result<FeatureRecord, FeatureError> {
        match document {
            Value::Mapping(_) | Value::Null => {}
            _ => return Err(FeatureError::feature_type(&[], "document is not a mapping")),
        }

        let workload_type = workload_type(lookup(document, WORKLOAD_PATH)?)?;

        let replica_count = integer_at(document, REPLICA_PATH)?;
        let replica_count = u32::try_from(replica_count).map_err(|_| {
            FeatureError::feature_type(
                REPLICA_PATH,
                format!("{} is not a valid replica count", replica_count),
            )
        })?;

        Ok(FeatureRecord {
            workload_type,
            replica_count,
            cpu_limit: integer_at(document, CPU_LIMIT_PATH)?,
            memory_limit: integer_at(document, MEMORY_LIMIT_PATH)?,
        })
    }
}

/// Walk `path`, treating a missing key anywhere along it as absent.
///
/// An intermediate node that exists but is not a mapping is an error.
fn lookup<'a>(document: &'a Value, path: &[&str]) -> Result<Option<&'a Value>, FeatureError> {
    let mut current = document;
    for (depth, key) in path.iter().enumerate() {
        let mapping = match current {
            Value::Mapping(mapping) => mapping,
            Value::Null => return Ok(None),
            _ => {
                return Err(FeatureError::feature_type(
                    &path[..depth],
                    "expected a mapping",
                ))
            }
        };
        match mapping.get(*key) {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn workload_type(value: Option<&Value>) -> Result<WorkloadType, FeatureError> {
    let raw = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => {
            return Err(FeatureError::feature_type(
                WORKLOAD_PATH,
                "expected a string",
            ))
        }
    };
    let upper = raw.trim().to_uppercase();
    upper
        .parse()
        .map_err(|_| FeatureError::UnknownWorkload(upper))
}

fn integer_at(document: &Value, path: &[&str]) -> Result<i64, FeatureError> {
    match lookup(document, path)? {
        None | Some(Value::Null) => Ok(0),
        Some(value) => coerce_integer(value).map_err(|reason| FeatureError::feature_type(path, reason)),
    }
}

/// Integer coercion: integers as-is, finite floats truncated toward zero,
/// strings holding an integer literal. Everything else is rejected.
fn coerce_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f.abs() < i64::MAX as f64 {
                    Ok(f.trunc() as i64)
                } else {
                    Err(format!("{} is out of range", n))
                }
            } else {
                Err(format!("{} is out of range", n))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", s)),
        Value::Bool(b) => Err(format!("boolean {} is not numeric", b)),
        Value::Sequence(_) => Err("sequence is not numeric".to_string()),
        Value::Mapping(_) => Err("mapping is not numeric".to_string()),
        Value::Tagged(_) => Err("tagged value is not numeric".to_string()),
        Value::Null => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(yaml: &str) -> Result<FeatureRecord, FeatureError> {
        FeatureExtractor::new().extract(yaml)
    }

    const BASELINE: &str = r#"
replicaCount: 1
namespace:
  app: compressor
resources:
  limits:
    cpu: 100
    memory: 256
"#;

    #[test]
    fn test_baseline_values() {
        let record = extract(BASELINE).unwrap();
        assert_eq!(
            record,
            FeatureRecord {
                workload_type: WorkloadType::Compressor,
                replica_count: 1,
                cpu_limit: 100,
                memory_limit: 256,
            }
        );
    }

    #[test]
    fn test_missing_numeric_fields_default_to_zero() {
        let record = extract("namespace:\n  app: Grayscaler\n").unwrap();
        assert_eq!(record.workload_type, WorkloadType::Grayscaler);
        assert_eq!(record.replica_count, 0);
        assert_eq!(record.cpu_limit, 0);
        assert_eq!(record.memory_limit, 0);

        let record = extract("namespace:\n  app: grayscaler\nresources: {}\n").unwrap();
        assert_eq!(record.cpu_limit, 0);
    }

    #[test]
    fn test_unknown_workload_names_value() {
        let err = extract("namespace:\n  app: router\n").unwrap_err();
        assert_eq!(err, FeatureError::UnknownWorkload("ROUTER".to_string()));
        assert!(err.to_string().contains("ROUTER"));
    }

    #[test]
    fn test_missing_workload_is_unknown() {
        assert_eq!(
            extract("replicaCount: 1\n").unwrap_err(),
            FeatureError::UnknownWorkload(String::new())
        );
        assert_eq!(
            extract("").unwrap_err(),
            FeatureError::UnknownWorkload(String::new())
        );
    }

    #[test]
    fn test_string_and_float_coercion() {
        let yaml = r#"
replicaCount: "2"
namespace: {app: compressor}
resources:
  limits:
    cpu: 100.9
    memory: " 512 "
"#;
        let record = extract(yaml).unwrap();
        assert_eq!(record.replica_count, 2);
        assert_eq!(record.cpu_limit, 100);
        assert_eq!(record.memory_limit, 512);
    }

    #[test]
    fn test_non_numeric_values_rejected() {
        let err = extract(
            "namespace: {app: compressor}\nresources:\n  limits:\n    cpu: 100m\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FeatureError::FeatureType { ref field, .. } if field == "resources.limits.cpu"
        ));

        let err = extract("namespace: {app: compressor}\nreplicaCount: true\n").unwrap_err();
        assert!(matches!(
            err,
            FeatureError::FeatureType { ref field, .. } if field == "replicaCount"
        ));

        let err = extract("namespace: {app: compressor}\nreplicaCount: [1, 2]\n").unwrap_err();
        assert!(matches!(err, FeatureError::FeatureType { .. }));
    }

    #[test]
    fn test_negative_replicas_rejected() {
        let err = extract("namespace: {app: compressor}\nreplicaCount: -1\n").unwrap_err();
        assert!(matches!(
            err,
            FeatureError::FeatureType { ref field, .. } if field == "replicaCount"
        ));
    }

    #[test]
    fn test_non_mapping_intermediate_rejected() {
        let err = extract("namespace: {app: compressor}\nresources: lots\n").unwrap_err();
        assert!(matches!(
            err,
            FeatureError::FeatureType { ref field, .. } if field == "resources"
        ));

        let err = extract("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, FeatureError::FeatureType { .. }));
    }

    #[test]
    fn test_invalid_yaml_is_descriptor_error() {
        let err = extract("namespace: [unclosed\n").unwrap_err();
        assert!(matches!(err, FeatureError::Descriptor(_)));
    }
}
