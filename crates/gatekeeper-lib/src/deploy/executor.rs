//! Gated release installation with per-release serialization

use super::{ReleaseTool, ToolError, ToolOutput};
use crate::models::ChartCandidate;
use crate::observability::GatekeeperMetrics;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

/// Process-wide async locks keyed by release name
///
/// Entries live only while someone holds or waits on them, so the map
/// stays bounded by the number of releases in flight.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReleaseLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ReleaseLocks {
    pub(crate) async fn acquire(&self, release: &str) -> ReleaseGuard {
        // Clone the Arc out so the shard guard is released before awaiting
        let lock = self
            .locks
            .entry(release.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        ReleaseGuard {
            release: release.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held lock on one release; drops the map entry when nobody else wants it
pub(crate) struct ReleaseGuard {
    release: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts as a holder
        drop(self.guard.take());
        self.locks
            .remove_if(&self.release, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Installs or upgrades charts that passed the gate
///
/// Invocations against the same release name never overlap, including
/// across concurrent requests sharing this executor.
#[derive(Clone)]
pub struct DeploymentExecutor {
    tool: Arc<dyn ReleaseTool>,
    overrides: Vec<String>,
    locks: ReleaseLocks,
    metrics: GatekeeperMetrics,
}

impl DeploymentExecutor {
    pub fn new(tool: Arc<dyn ReleaseTool>, overrides: Vec<String>) -> Self {
        Self {
            tool,
            overrides,
            locks: ReleaseLocks::default(),
            metrics: GatekeeperMetrics::new(),
        }
    }

    pub fn tool(&self) -> &Arc<dyn ReleaseTool> {
        &self.tool
    }

    pub fn overrides(&self) -> &[String] {
        &self.overrides
    }

    pub(crate) fn locks(&self) -> &ReleaseLocks {
        &self.locks
    }

    pub async fn deploy(&self, candidate: &ChartCandidate) -> Result<ToolOutput, ToolError> {
        let release = candidate.release_name.as_str();
        let _guard = self.locks.acquire(release).await;

        let start = Instant::now();
        let result = self
            .tool
            .install_or_upgrade(release, &candidate.path, &self.overrides)
            .await;
        self.metrics
            .observe_tool_latency("install", start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => info!(release = %release, chart_path = %candidate.relative_path, "Release installed"),
            Err(e) => warn!(release = %release, chart_path = %candidate.relative_path, error = %e, "Release install failed"),
        }
        result
    }
}
