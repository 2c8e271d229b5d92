//! Resource telemetry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One resource-usage sample taken during process execution
///
/// `cpu` is a percentage (process- or cgroup-relative depending on the
/// sampler configuration), `memory` is resident set size in MB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub memory: f64,
}
