use pact_core::models::{HealthStatus, SyncHealthReport};
use pact_core::util::now_millis;

use crate::commands::common::{
    format_optional_time, open_remote_session, open_session, print_json, SessionArgs,
};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_remote_session(args).await?;
    let report = session.relationships().force_sync_all().await?;

    if as_json {
        return print_json(&report);
    }
    println!(
        "Sync {}: {} collection(s) synced, {} failed, {} operation(s) confirmed, {} conflict(s) found",
        report.state.as_str(),
        report.synced_collections.len(),
        report.failed_collections.len(),
        report.flush.removed(),
        report.conflicts_found
    );
    Ok(())
}

pub async fn run_health(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let report = session.health().await?;

    if as_json {
        return print_json(&report);
    }
    for line in format_health_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_stats(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let stats = session.statistics().await?;

    if as_json {
        return print_json(&stats);
    }

    println!("Records: {}", stats.total_records());
    for (collection, count) in &stats.records {
        println!("  {collection}: {count}");
    }
    println!("Pending operations: {}", stats.total_pending());
    for (collection, count) in &stats.pending_operations {
        println!("  {collection}: {count}");
    }
    println!("Active conflicts: {}", stats.total_conflicts());
    for (priority, count) in &stats.conflicts_by_priority {
        println!("  {priority}: {count}");
    }
    println!("Relationships: {}", stats.relationships);
    println!("Backups: {}", stats.backups);
    println!(
        "Syncs: {} total, {} failed, reliability {:.0}%",
        stats.metrics.total_syncs, stats.metrics.failed_syncs, stats.metrics.reliability_score
    );
    Ok(())
}

pub fn format_health_lines(report: &SyncHealthReport) -> Vec<String> {
    let status = match report.status {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Warning => "warning",
        HealthStatus::Critical => "critical",
    };
    let mut lines = vec![format!(
        "Status: {status} (reliability {:.0}%, {} active conflict(s), last sync {})",
        report.reliability_score,
        report.active_conflicts,
        format_optional_time(report.last_successful_sync, now_millis())
    )];

    for issue in &report.issues {
        lines.push(format!(
            "[{:?}] {}: {}",
            issue.severity, issue.title, issue.description
        ));
        for action in &issue.suggested_actions {
            lines.push(format!("  - {action}"));
        }
    }
    lines
}
