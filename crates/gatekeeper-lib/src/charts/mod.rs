//! Chart discovery and feature extraction
//!
//! Discovery is a pure walk over an extracted tree; extraction turns a
//! chart's `values.yaml` into the feature record scored by the gate.

mod features;
mod locator;

pub use features::{FeatureError, FeatureExtractor};
pub use locator::locate_charts;

/// File that marks a directory as a chart
pub const CHART_DESCRIPTOR: &str = "Chart.yaml";

/// File declaring the chart's resource profile
pub const VALUES_DESCRIPTOR: &str = "values.yaml";
