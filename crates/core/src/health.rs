//! Dependency health reporting

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Free-space probe used by the storage guard and health checks.
pub trait DiskProbe: Send + Sync {
    fn free_bytes(&self, path: &Path) -> Result<u64>;
}

/// Severity of one health check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthSeverity {
    Healthy,
    Warning,
    Unhealthy,
}

impl std::fmt::Display for HealthSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthSeverity::Healthy => write!(f, "healthy"),
            HealthSeverity::Warning => write!(f, "warning"),
            HealthSeverity::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of probing one dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// e.g. `database`, `client:qbittorrent`, `indexer:prowlarr`, `disk:/media/movies`
    pub component: String,
    pub severity: HealthSeverity,
    pub message: String,
    pub latency_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            component: component.into(),
            severity: HealthSeverity::Healthy,
            message: "ok".to_string(),
            latency_ms: Some(latency_ms),
            checked_at: Utc::now(),
        }
    }

    pub fn warning(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            severity: HealthSeverity::Warning,
            message: message.into(),
            latency_ms: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            severity: HealthSeverity::Unhealthy,
            message: message.into(),
            latency_ms: None,
            checked_at: Utc::now(),
        }
    }
}

/// Aggregate of the most recent checks, one per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    /// The worst severity across all checks.
    pub fn overall(&self) -> HealthSeverity {
        self.checks
            .iter()
            .map(|c| c.severity)
            .max()
            .unwrap_or(HealthSeverity::Healthy)
    }

    /// Replace the check for a component, keeping one entry per component.
    pub fn record(&mut self, check: HealthCheck) {
        self.checks.retain(|c| c.component != check.component);
        self.checks.push(check);
    }
}
