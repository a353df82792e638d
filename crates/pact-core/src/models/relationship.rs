//! Owner/keyholder relationship sync status

use serde::{Deserialize, Serialize};

use super::{ConflictId, OperationId, OperationKind, SyncCollection};

/// Latency at or below which the latency sub-score is perfect
const LATENCY_FLOOR_MS: u64 = 500;

/// Measured quality of the last relationship sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQuality {
    /// Overall 0-100 score
    pub score: f64,
    pub latency_ms: u64,
    /// 0-100, share of collections that synced
    pub reliability: f64,
    /// 0-100, penalised by unresolved conflicts
    pub data_integrity: f64,
    pub measured_at: i64,
}

impl SyncQuality {
    /// Quality of a relationship that has not been measured yet.
    pub const fn unmeasured(at: i64) -> Self {
        Self {
            score: 100.0,
            latency_ms: 0,
            reliability: 100.0,
            data_integrity: 100.0,
            measured_at: at,
        }
    }

    /// Weighted score: reliability 50%, integrity 30%, latency 20%.
    ///
    /// The latency sub-score is 100 up to 500 ms and falls linearly to 0 at
    /// `latency_budget_ms`.
    #[allow(clippy::cast_precision_loss)]
    pub fn measure(
        latency_ms: u64,
        reliability: f64,
        data_integrity: f64,
        latency_budget_ms: u64,
        at: i64,
    ) -> Self {
        let latency_score = if latency_ms <= LATENCY_FLOOR_MS {
            100.0
        } else if latency_ms >= latency_budget_ms || latency_budget_ms <= LATENCY_FLOOR_MS {
            0.0
        } else {
            let span = (latency_budget_ms - LATENCY_FLOOR_MS) as f64;
            100.0 * (1.0 - (latency_ms - LATENCY_FLOOR_MS) as f64 / span)
        };
        let reliability = reliability.clamp(0.0, 100.0);
        let data_integrity = data_integrity.clamp(0.0, 100.0);
        let score = latency_score.mul_add(0.2, reliability.mul_add(0.5, data_integrity * 0.3));
        Self {
            score: score.clamp(0.0, 100.0),
            latency_ms,
            reliability,
            data_integrity,
            measured_at: at,
        }
    }
}

/// Rough estimate of the link to the partner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStrength {
    Strong,
    Moderate,
    Weak,
    #[default]
    Offline,
}

impl ConnectionStrength {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
            Self::Offline => "offline",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "strong" => Self::Strong,
            "moderate" => Self::Moderate,
            "weak" => Self::Weak,
            _ => Self::Offline,
        }
    }

    /// Estimate from the last attempt's reliability and latency.
    pub fn estimate(reliability: f64, latency_ms: u64) -> Self {
        if reliability <= 0.0 {
            Self::Offline
        } else if reliability >= 100.0 && latency_ms <= 1_000 {
            Self::Strong
        } else if reliability >= 50.0 && latency_ms <= 5_000 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }
}

/// A queued local change that touches relationship data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub operation_id: OperationId,
    pub collection: String,
    pub kind: OperationKind,
    pub queued_at: i64,
}

/// Sync status for one owner/keyholder pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSyncStatus {
    pub relationship_id: String,
    pub partner_id: String,
    pub partner_name: String,
    /// Last fully successful sync (Unix ms)
    pub last_sync: Option<i64>,
    pub quality: SyncQuality,
    pub pending_changes: Vec<PendingChange>,
    /// Unresolved conflicts scoped to this relationship
    pub conflicts: Vec<ConflictId>,
    pub is_online: bool,
    pub connection_strength: ConnectionStrength,
}

impl RelationshipSyncStatus {
    pub fn new(
        relationship_id: impl Into<String>,
        partner_id: impl Into<String>,
        partner_name: impl Into<String>,
        at: i64,
    ) -> Self {
        Self {
            relationship_id: relationship_id.into(),
            partner_id: partner_id.into(),
            partner_name: partner_name.into(),
            last_sync: None,
            quality: SyncQuality::unmeasured(at),
            pending_changes: Vec::new(),
            conflicts: Vec::new(),
            is_online: false,
            connection_strength: ConnectionStrength::Offline,
        }
    }
}

/// Outcome of one relationship-scoped sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSyncResult {
    pub relationship_id: String,
    pub success: bool,
    pub synced_collections: Vec<SyncCollection>,
    /// Requested but withheld by permissions
    pub skipped_collections: Vec<SyncCollection>,
    pub conflicts_found: usize,
    pub conflicts_resolved: usize,
    pub duration_ms: u64,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

impl RelationshipSyncResult {
    pub fn failed(relationship_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            relationship_id: relationship_id.into(),
            success: false,
            synced_collections: Vec::new(),
            skipped_collections: Vec::new(),
            conflicts_found: 0,
            conflicts_resolved: 0,
            duration_ms: 0,
            bytes_transferred: 0,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_clean_sync_scores_perfect() {
        let quality = SyncQuality::measure(120, 100.0, 100.0, 10_000, 1);
        assert!((quality.score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn latency_beyond_budget_costs_twenty_points() {
        let quality = SyncQuality::measure(20_000, 100.0, 100.0, 10_000, 1);
        assert!((quality.score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn failed_sync_scores_low() {
        let quality = SyncQuality::measure(300, 0.0, 100.0, 10_000, 1);
        assert!((quality.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn connection_strength_estimate() {
        assert_eq!(ConnectionStrength::estimate(100.0, 200), ConnectionStrength::Strong);
        assert_eq!(ConnectionStrength::estimate(75.0, 2_000), ConnectionStrength::Moderate);
        assert_eq!(ConnectionStrength::estimate(25.0, 200), ConnectionStrength::Weak);
        assert_eq!(ConnectionStrength::estimate(0.0, 0), ConnectionStrength::Offline);
    }
}
