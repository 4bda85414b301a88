//! Gatekeeper library for anomaly-gated chart deployment
//!
//! This crate provides the core functionality for:
//! - Safe expansion of uploaded chart archives
//! - Chart discovery and feature extraction from values descriptors
//! - Scoring resource profiles against a trained baseline
//! - Installing, uninstalling and inspecting releases through helm
//! - Health checks and observability

pub mod archive;
pub mod charts;
pub mod deploy;
pub mod gate;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;

pub use deploy::{
    DeploymentExecutor, HelmCli, ReleaseError, ReleaseManager, ReleaseStatus, ReleaseTool,
    ToolError, ToolOutput,
};
pub use gate::{AnomalyGate, ArtifactError, ArtifactSource, GateError, DEFAULT_DECISION_THRESHOLD};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{GatekeeperMetrics, StructuredLogger};
pub use pipeline::{Gatekeeper, GatekeeperError, PipelineConfig};
