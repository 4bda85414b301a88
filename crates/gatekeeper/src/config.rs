//! Gatekeeper configuration
//!
//! Read from `GATEKEEPER_*` environment variables, optionally layered over a
//! file named by `GATEKEEPER_CONFIG`. Anything that fails to parse or
//! validate stops startup.

use anyhow::{ensure, Context, Result};
use gatekeeper_lib::archive::DEFAULT_MAX_EXTRACTED_BYTES;
use gatekeeper_lib::deploy::{DEFAULT_SET_OVERRIDES, DEFAULT_TOOL_TIMEOUT};
use gatekeeper_lib::{ArtifactSource, PipelineConfig, DEFAULT_DECISION_THRESHOLD};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "GATEKEEPER";
const CONFIG_FILE_VAR: &str = "GATEKEEPER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct GatekeeperConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_transform_artifact")]
    pub transform_artifact: PathBuf,

    #[serde(default = "default_classifier_artifact")]
    pub classifier_artifact: PathBuf,

    #[serde(default)]
    pub transform_sha256: Option<String>,

    #[serde(default)]
    pub classifier_sha256: Option<String>,

    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,

    #[serde(default = "default_helm_binary")]
    pub helm_binary: PathBuf,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// `key=value` pairs passed as `--set` on every install/upgrade
    #[serde(default = "default_set_overrides")]
    pub set_overrides: Vec<String>,

    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Upper bound on the upload request body
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: usize,

    #[serde(default = "default_max_extracted_bytes")]
    pub max_extracted_bytes: u64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "gatekeeper".to_string())
}

fn default_listen_port() -> u16 {
    8000
}

fn default_transform_artifact() -> PathBuf {
    PathBuf::from("artifacts/transform.json")
}

fn default_classifier_artifact() -> PathBuf {
    PathBuf::from("artifacts/classifier.json")
}

fn default_decision_threshold() -> f64 {
    DEFAULT_DECISION_THRESHOLD
}

fn default_helm_binary() -> PathBuf {
    PathBuf::from("helm")
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT.as_secs()
}

fn default_set_overrides() -> Vec<String> {
    DEFAULT_SET_OVERRIDES.iter().map(|s| s.to_string()).collect()
}

fn default_max_archive_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_extracted_bytes() -> u64 {
    DEFAULT_MAX_EXTRACTED_BYTES
}

impl GatekeeperConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from);
        Self::load_from(file, None)
    }

    /// Load from an optional file plus environment variables.
    ///
    /// `env` replaces the process environment when given.
    pub fn load_from(file: Option<PathBuf>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("set_overrides")
                .source(env),
        );

        let config: GatekeeperConfig = builder
            .build()
            .context("Failed to read gatekeeper configuration")?
            .try_deserialize()
            .context("Invalid gatekeeper configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.decision_threshold.is_finite(),
            "decision_threshold must be finite"
        );
        ensure!(self.tool_timeout_secs > 0, "tool_timeout_secs must be positive");
        ensure!(self.max_archive_bytes > 0, "max_archive_bytes must be positive");
        ensure!(
            self.max_extracted_bytes > 0,
            "max_extracted_bytes must be positive"
        );
        for value in &self.set_overrides {
            ensure!(
                value.contains('='),
                "set_overrides entry '{}' is not key=value",
                value
            );
        }
        Ok(())
    }

    pub fn transform_source(&self) -> ArtifactSource {
        ArtifactSource {
            path: self.transform_artifact.clone(),
            sha256: self.transform_sha256.clone(),
        }
    }

    pub fn classifier_source(&self) -> ArtifactSource {
        ArtifactSource {
            path: self.classifier_artifact.clone(),
            sha256: self.classifier_sha256.clone(),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            scratch_root: self.scratch_root.clone(),
            max_extracted_bytes: self.max_extracted_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = GatekeeperConfig::load_from(None, env(&[])).unwrap();
        assert_eq!(config.listen_port, 8000);
        assert_eq!(config.decision_threshold, 0.0);
        assert_eq!(config.helm_binary, PathBuf::from("helm"));
        assert_eq!(config.tool_timeout(), Duration::from_secs(120));
        assert_eq!(config.set_overrides, vec!["image.pullPolicy=Never".to_string()]);
        assert_eq!(config.max_archive_bytes, 64 * 1024 * 1024);
        assert_eq!(config.max_extracted_bytes, 256 * 1024 * 1024);
        assert!(config.scratch_root.is_none());
        assert!(config.transform_source().sha256.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = GatekeeperConfig::load_from(
            None,
            env(&[
                ("GATEKEEPER_LISTEN_PORT", "9100"),
                ("GATEKEEPER_DECISION_THRESHOLD", "-0.25"),
                ("GATEKEEPER_SET_OVERRIDES", "image.pullPolicy=Always,replicaCount=2"),
                ("GATEKEEPER_CLASSIFIER_SHA256", "abc123"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listen_port, 9100);
        assert_eq!(config.decision_threshold, -0.25);
        assert_eq!(
            config.set_overrides,
            vec!["image.pullPolicy=Always".to_string(), "replicaCount=2".to_string()]
        );
        assert_eq!(config.classifier_source().sha256.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "listen_port = 8443\ntool_timeout_secs = 30").unwrap();

        let config =
            GatekeeperConfig::load_from(Some(file.path().to_path_buf()), env(&[])).unwrap();
        assert_eq!(config.listen_port, 8443);
        assert_eq!(config.tool_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(
            GatekeeperConfig::load_from(None, env(&[("GATEKEEPER_LISTEN_PORT", "not-a-port")]))
                .is_err()
        );
        assert!(
            GatekeeperConfig::load_from(None, env(&[("GATEKEEPER_TOOL_TIMEOUT_SECS", "0")]))
                .is_err()
        );
        assert!(GatekeeperConfig::load_from(
            None,
            env(&[("GATEKEEPER_SET_OVERRIDES", "image.pullPolicy")])
        )
        .is_err());
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let missing = PathBuf::from("/nonexistent/gatekeeper.toml");
        assert!(GatekeeperConfig::load_from(Some(missing), env(&[])).is_err());
    }
}
