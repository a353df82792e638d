//! Cumulative sync counters

use serde::{Deserialize, Serialize};

/// Monotonic per-user sync counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub user_id: String,
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub bytes_transferred: u64,
    pub conflicts_resolved: u64,
    /// Unix ms of the last successful orchestrated sync
    pub last_successful_sync: Option<i64>,
    /// 0-100, derived from the failure ratio
    pub reliability_score: f64,
}

impl SyncMetrics {
    /// Zeroed counters; a user who never synced is fully reliable.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_syncs: 0,
            successful_syncs: 0,
            failed_syncs: 0,
            bytes_transferred: 0,
            conflicts_resolved: 0,
            last_successful_sync: None,
            reliability_score: 100.0,
        }
    }

    /// Reliability for the given counters: `100 * (1 - failed / total)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn reliability_for(total_syncs: u64, failed_syncs: u64) -> f64 {
        if total_syncs == 0 {
            return 100.0;
        }
        let failure_ratio = failed_syncs.min(total_syncs) as f64 / total_syncs as f64;
        (1.0 - failure_ratio) * 100.0
    }

    /// Count one orchestrated sync attempt.
    pub fn record_attempt(&mut self, success: bool, bytes: u64, at: i64) {
        self.total_syncs = self.total_syncs.saturating_add(1);
        if success {
            self.successful_syncs = self.successful_syncs.saturating_add(1);
            self.last_successful_sync = Some(at);
        } else {
            self.failed_syncs = self.failed_syncs.saturating_add(1);
        }
        self.bytes_transferred = self.bytes_transferred.saturating_add(bytes);
        self.reliability_score = Self::reliability_for(self.total_syncs, self.failed_syncs);
    }

    pub fn record_resolved(&mut self, count: u64) {
        self.conflicts_resolved = self.conflicts_resolved.saturating_add(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metrics_are_fully_reliable() {
        let metrics = SyncMetrics::empty("u1");
        assert!((metrics.reliability_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(metrics.last_successful_sync, None);
    }

    #[test]
    fn reliability_tracks_failure_ratio() {
        let mut metrics = SyncMetrics::empty("u1");
        metrics.record_attempt(true, 10, 1);
        metrics.record_attempt(false, 0, 2);
        metrics.record_attempt(false, 0, 3);
        metrics.record_attempt(true, 5, 4);

        assert_eq!(metrics.total_syncs, 4);
        assert_eq!(metrics.successful_syncs, 2);
        assert_eq!(metrics.failed_syncs, 2);
        assert_eq!(metrics.bytes_transferred, 15);
        assert_eq!(metrics.last_successful_sync, Some(4));
        assert!((metrics.reliability_score - 50.0).abs() < f64::EPSILON);
    }
}
