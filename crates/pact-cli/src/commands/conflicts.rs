use pact_core::models::{ConflictId, ConflictResolution, DataConflict, ResolutionStrategy};
use pact_core::util::now_millis;

use crate::commands::common::{
    format_relative_time, open_session, parse_global_strategy, print_json, SessionArgs,
};
use crate::error::CliError;

pub async fn run_conflicts_list(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let conflicts = session.conflicts().list().await?;

    if as_json {
        return print_json(&conflicts);
    }
    if conflicts.is_empty() {
        println!("No active conflicts.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts, now_millis()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_conflict_resolve(
    id: &str,
    strategy: &str,
    resolved_by: Option<String>,
    as_json: bool,
    args: &SessionArgs,
) -> Result<(), CliError> {
    let id: ConflictId = id
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("invalid conflict id '{id}'")))?;
    let resolution = ConflictResolution {
        strategy: strategy.parse::<ResolutionStrategy>()?,
        resolved_by,
    };

    let session = open_session(args).await?;
    let resolved = session.conflicts().resolve(&id, &resolution).await?;

    if as_json {
        return print_json(&resolved);
    }
    println!(
        "Resolved {} {} with {}:",
        resolved.entity_kind, resolved.entity_id, resolved.strategy
    );
    println!("{}", serde_json::to_string_pretty(&resolved.resolved)?);
    Ok(())
}

pub async fn run_resolve_all(
    default: &str,
    overrides: &[String],
    as_json: bool,
    args: &SessionArgs,
) -> Result<(), CliError> {
    let strategy = parse_global_strategy(default, overrides)?;
    let session = open_session(args).await?;
    let results = session.conflicts().resolve_all(&strategy).await?;

    if as_json {
        return print_json(&results);
    }

    let resolved = results.iter().filter(|result| result.success).count();
    println!("Resolved {resolved} of {} conflict(s)", results.len());
    for failed in results.iter().filter(|result| !result.success) {
        println!(
            "  {} ({}): {}",
            failed.conflict_id,
            failed.strategy,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub fn format_conflict_lines(conflicts: &[DataConflict], now_ms: i64) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{} [{}] {} {} {} strategy={} {}",
                conflict.id,
                conflict.priority,
                conflict.conflict_type,
                conflict.entity_kind,
                conflict.entity_id,
                conflict.strategy,
                format_relative_time(conflict.detected_at, now_ms)
            )
        })
        .collect()
}
