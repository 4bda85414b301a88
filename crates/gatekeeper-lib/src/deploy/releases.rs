//! Uninstall and status lookups for individual releases

use super::executor::{DeploymentExecutor, ReleaseLocks};
use super::{ReleaseTool, ToolError, ToolOutput};
use crate::observability::GatekeeperMetrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Invalid release name: {0}")]
    Validation(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// A release found by the status lookup
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseStatus {
    pub release: String,
    /// Parsed JSON from the tool, or the raw text if it was not JSON
    pub details: serde_json::Value,
}

#[derive(Clone)]
pub struct ReleaseManager {
    tool: Arc<dyn ReleaseTool>,
    locks: ReleaseLocks,
    metrics: GatekeeperMetrics,
}

impl ReleaseManager {
    pub fn new(tool: Arc<dyn ReleaseTool>) -> Self {
        Self {
            tool,
            locks: ReleaseLocks::default(),
            metrics: GatekeeperMetrics::new(),
        }
    }

    /// Share the executor's tool and release locks, so an uninstall never
    /// interleaves with an install of the same release
    pub fn for_executor(executor: &DeploymentExecutor) -> Self {
        Self {
            tool: executor.tool().clone(),
            locks: executor.locks().clone(),
            metrics: GatekeeperMetrics::new(),
        }
    }

    pub async fn uninstall(&self, release: &str) -> Result<ToolOutput, ReleaseError> {
        let release = validate_release(release)?;
        let _guard = self.locks.acquire(release).await;

        let start = Instant::now();
        let result = self.tool.uninstall(release).await;
        self.metrics
            .observe_tool_latency("uninstall", start.elapsed().as_secs_f64());
        Ok(result?)
    }

    pub async fn status(&self, release: &str) -> Result<ReleaseStatus, ReleaseError> {
        let release = validate_release(release)?;

        let start = Instant::now();
        let result = self.tool.status(release).await;
        self.metrics
            .observe_tool_latency("status", start.elapsed().as_secs_f64());

        let output = result?;
        let details = serde_json::from_str(&output.stdout)
            .unwrap_or_else(|_| serde_json::Value::String(output.stdout.trim().to_string()));
        Ok(ReleaseStatus {
            release: release.to_string(),
            details,
        })
    }
}

fn validate_release(release: &str) -> Result<&str, ReleaseError> {
    let trimmed = release.trim();
    if trimmed.is_empty() {
        return Err(ReleaseError::Validation(
            "release name must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
