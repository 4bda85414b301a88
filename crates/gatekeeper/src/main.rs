//! Chart Gatekeeper - anomaly-gated Helm deployment service
//!
//! Accepts chart archives over HTTP, scores each chart's resource profile
//! against the trained baseline and installs only the charts that look
//! normal.

use anyhow::{Context, Result};
use gatekeeper::{api, config::GatekeeperConfig};
use gatekeeper_lib::{
    gate::load_gate,
    health::{components, HealthRegistry},
    observability::{GatekeeperMetrics, StructuredLogger},
    DeploymentExecutor, Gatekeeper, HelmCli, ReleaseManager, ReleaseTool,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const GATEKEEPER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting chart-gatekeeper");

    let config = GatekeeperConfig::load()?;
    info!(
        listen_port = config.listen_port,
        helm_binary = %config.helm_binary.display(),
        "Gatekeeper configured"
    );

    let health_registry = HealthRegistry::new();
    let metrics = GatekeeperMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let gate = load_gate(
        &config.transform_source(),
        &config.classifier_source(),
        config.decision_threshold,
    )
    .context("Failed to load anomaly gate artifacts")?;
    metrics.set_artifact_versions(gate.transform_version(), gate.classifier_version());
    health_registry.set_healthy(components::GATE).await;

    let helm = HelmCli::new(&config.helm_binary).with_timeout(config.tool_timeout());
    match helm.probe().await {
        Ok(output) => {
            info!(version = %output.stdout.trim(), "Release tool available");
            health_registry.set_healthy(components::RELEASE_TOOL).await;
        }
        Err(e) => {
            warn!(error = %e, "Release tool probe failed");
            health_registry
                .set_degraded(components::RELEASE_TOOL, e.to_string())
                .await;
        }
    }

    let executor = DeploymentExecutor::new(Arc::new(helm), config.set_overrides.clone());
    let releases = ReleaseManager::for_executor(&executor);
    let gatekeeper = Gatekeeper::new(config.pipeline_config(), gate, executor, logger.clone());

    logger.log_startup(
        GATEKEEPER_VERSION,
        gatekeeper.gate().transform_version(),
        gatekeeper.gate().classifier_version(),
    );

    let app_state = Arc::new(api::AppState {
        gatekeeper,
        releases,
        health_registry: health_registry.clone(),
        logger: logger.clone(),
        max_archive_bytes: config.max_archive_bytes,
    });

    health_registry.set_ready(true).await;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    api::serve(config.listen_port, app_state, shutdown).await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
