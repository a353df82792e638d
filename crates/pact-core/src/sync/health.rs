//! Health report derived from conflicts and metrics.

use crate::config::SyncEngineConfig;
use crate::models::{
    ConflictPriority, DataConflict, HealthIssue, HealthStatus, IssueSeverity, SyncHealthReport,
    SyncMetrics,
};

/// Reliability below this raises a high-severity issue
const RELIABILITY_THRESHOLD: f64 = 70.0;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Build a health report. Pure: reads its inputs and nothing else.
pub fn assess_health(
    conflicts: &[DataConflict],
    metrics: &SyncMetrics,
    config: &SyncEngineConfig,
    now: i64,
) -> SyncHealthReport {
    let mut issues = Vec::new();

    let critical = conflicts
        .iter()
        .filter(|conflict| conflict.priority == ConflictPriority::Critical)
        .count();
    if critical > 0 {
        issues.push(HealthIssue {
            severity: IssueSeverity::Critical,
            title: "Critical conflicts need attention".to_string(),
            description: format!(
                "{critical} critical conflict(s) cannot be resolved automatically"
            ),
            suggested_actions: vec![
                "Review each critical conflict and pick the version to keep".to_string(),
                "Check sharing permissions with your partner".to_string(),
            ],
        });
    }

    if metrics.reliability_score < RELIABILITY_THRESHOLD {
        issues.push(HealthIssue {
            severity: IssueSeverity::High,
            title: "Sync is unreliable".to_string(),
            description: format!(
                "{:.0}% of syncs succeed ({} of {} failed)",
                metrics.reliability_score, metrics.failed_syncs, metrics.total_syncs
            ),
            suggested_actions: vec![
                "Check your network connection".to_string(),
                "Run a full sync once back online".to_string(),
            ],
        });
    }

    if conflicts.len() > config.conflict_backlog_warning {
        issues.push(HealthIssue {
            severity: IssueSeverity::Medium,
            title: "Conflict backlog is growing".to_string(),
            description: format!("{} conflicts are waiting to be resolved", conflicts.len()),
            suggested_actions: vec![
                "Resolve pending conflicts or run resolve-all with a default strategy".to_string(),
            ],
        });
    }

    let stale_after = i64::from(config.stale_sync_hours).saturating_mul(HOUR_MS);
    if let Some(last) = metrics.last_successful_sync {
        if now.saturating_sub(last) > stale_after {
            issues.push(HealthIssue {
                severity: IssueSeverity::Medium,
                title: "Data has not synced recently".to_string(),
                description: format!(
                    "Last successful sync was {} hour(s) ago",
                    now.saturating_sub(last) / HOUR_MS
                ),
                suggested_actions: vec!["Connect to the network and sync".to_string()],
            });
        }
    }

    issues.sort_by(|a, b| b.severity.cmp(&a.severity));

    SyncHealthReport {
        status: overall_status(&issues),
        active_conflicts: conflicts.len(),
        reliability_score: metrics.reliability_score,
        last_successful_sync: metrics.last_successful_sync,
        generated_at: now,
        issues,
    }
}

fn overall_status(issues: &[HealthIssue]) -> HealthStatus {
    let worst = issues.iter().map(|issue| issue.severity).max();
    match worst {
        Some(IssueSeverity::Critical) => HealthStatus::Critical,
        Some(IssueSeverity::High) => HealthStatus::Warning,
        Some(IssueSeverity::Medium) | None => HealthStatus::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConflictContext, ConflictType, ConflictVersions, EntityKind, NewConflict,
    };
    use serde_json::json;

    fn conflict(conflict_type: ConflictType) -> DataConflict {
        DataConflict::detect(
            NewConflict::new(
                conflict_type,
                EntityKind::Session,
                "s1",
                ConflictVersions::new(json!({}), json!({})),
                ConflictContext::for_user("u1"),
            ),
            0,
        )
    }

    #[test]
    fn clean_state_is_healthy() {
        let report = assess_health(&[], &SyncMetrics::empty("u1"), &SyncEngineConfig::default(), 1);
        assert!(report.is_healthy());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn critical_conflict_makes_status_critical() {
        let conflicts = vec![conflict(ConflictType::PrivacyViolation)];
        let report =
            assess_health(&conflicts, &SyncMetrics::empty("u1"), &SyncEngineConfig::default(), 1);

        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(report.issues[0].severity, IssueSeverity::Critical);
        assert_eq!(report.active_conflicts, 1);
    }

    #[test]
    fn low_reliability_is_a_warning() {
        let mut metrics = SyncMetrics::empty("u1");
        metrics.record_attempt(true, 0, 1);
        metrics.record_attempt(false, 0, 2);

        let report = assess_health(&[], &metrics, &SyncEngineConfig::default(), 3);

        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, IssueSeverity::High);
    }

    #[test]
    fn medium_issues_alone_stay_healthy() {
        let config = SyncEngineConfig {
            conflict_backlog_warning: 1,
            ..SyncEngineConfig::default()
        };
        let conflicts = vec![
            conflict(ConflictType::DataModified),
            conflict(ConflictType::DataModified),
        ];
        let mut metrics = SyncMetrics::empty("u1");
        metrics.record_attempt(true, 0, 0);

        let report = assess_health(&conflicts, &metrics, &config, 48 * HOUR_MS);

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn every_issue_has_suggested_actions() {
        let config = SyncEngineConfig {
            conflict_backlog_warning: 0,
            ..SyncEngineConfig::default()
        };
        let mut metrics = SyncMetrics::empty("u1");
        metrics.record_attempt(false, 0, 0);
        metrics.record_attempt(true, 0, 0);
        metrics.record_attempt(false, 0, 0);
        let conflicts = vec![conflict(ConflictType::PrivacyViolation)];

        let report = assess_health(&conflicts, &metrics, &config, 100 * HOUR_MS);

        assert!(report.issues.len() >= 3);
        assert!(report
            .issues
            .iter()
            .all(|issue| !issue.suggested_actions.is_empty()));
        assert_eq!(report.issues[0].severity, IssueSeverity::Critical);
    }
}
