//! Release tool integration
//!
//! Everything that touches the cluster goes through [`ReleaseTool`]. The
//! production implementation shells out to `helm`; tests substitute stubs.

mod executor;
mod helm;
mod releases;

pub use executor::DeploymentExecutor;
pub use helm::HelmCli;
pub use releases::{ReleaseError, ReleaseManager, ReleaseStatus};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default `--set` overrides applied on every install/upgrade
pub const DEFAULT_SET_OVERRIDES: &[&str] = &["image.pullPolicy=Never"];

/// Default ceiling for one tool invocation
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Release tool exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Release tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to run release tool: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl ToolError {
    /// Output worth surfacing to the caller, if the tool produced any
    pub fn captured_log(&self) -> Option<&str> {
        match self {
            ToolError::NonZeroExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// The three operations the gatekeeper needs from a release manager
#[async_trait]
pub trait ReleaseTool: Send + Sync {
    async fn install_or_upgrade(
        &self,
        release: &str,
        chart_path: &Path,
        overrides: &[String],
    ) -> Result<ToolOutput, ToolError>;

    async fn uninstall(&self, release: &str) -> Result<ToolOutput, ToolError>;

    async fn status(&self, release: &str) -> Result<ToolOutput, ToolError>;

    /// Cheap liveness probe used at startup
    async fn probe(&self) -> Result<ToolOutput, ToolError>;
}
