//! Sync health report model

use serde::{Deserialize, Serialize};

/// Overall sync health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Severity of one health issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Medium,
    High,
    Critical,
}

/// One problem found in the current sync state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub severity: IssueSeverity,
    pub title: String,
    pub description: String,
    /// Never empty
    pub suggested_actions: Vec<String>,
}

/// Derived, side-effect-free view of conflicts and metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHealthReport {
    pub status: HealthStatus,
    pub issues: Vec<HealthIssue>,
    pub active_conflicts: usize,
    pub reliability_score: f64,
    pub last_successful_sync: Option<i64>,
    pub generated_at: i64,
}

impl SyncHealthReport {
    pub const fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy)
    }
}
