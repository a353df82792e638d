use pact_core::models::{RelationshipSyncResult, RelationshipSyncStatus};
use pact_core::util::now_millis;

use crate::commands::common::{
    format_optional_time, open_remote_session, open_session, print_json, SessionArgs,
};
use crate::error::CliError;

pub async fn run_relationships_list(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let relationships = session.relationships().relationships().await?;

    if as_json {
        return print_json(&relationships);
    }
    if relationships.is_empty() {
        println!("No relationships tracked.");
        return Ok(());
    }

    let now = now_millis();
    for status in &relationships {
        println!("{}", format_relationship_line(status, now));
    }
    println!(
        "Overall quality: {:.0}",
        session.relationships().sync_quality().await?
    );
    Ok(())
}

pub async fn run_relationship_add(
    id: &str,
    partner_id: &str,
    name: &str,
    args: &SessionArgs,
) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let status = session
        .relationships()
        .add_relationship(id, partner_id, name)
        .await?;
    println!("Tracking relationship {} with {}", status.relationship_id, status.partner_id);
    Ok(())
}

pub async fn run_relationship_remove(id: &str, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    session.relationships().remove_relationship(id).await?;
    println!("Removed relationship {id}");
    Ok(())
}

pub async fn run_relationship_sync(
    id: Option<&str>,
    as_json: bool,
    args: &SessionArgs,
) -> Result<(), CliError> {
    let session = open_remote_session(args).await?;
    let results = match id {
        Some(id) => vec![session.relationships().sync_relationship(id).await?],
        None => session.relationships().sync_all_relationships().await?,
    };

    if as_json {
        return print_json(&results);
    }
    if results.is_empty() {
        println!("No relationships tracked.");
    }
    for result in &results {
        println!("{}", format_sync_result(result));
    }
    Ok(())
}

pub fn format_relationship_line(status: &RelationshipSyncStatus, now_ms: i64) -> String {
    let name = if status.partner_name.is_empty() {
        status.partner_id.as_str()
    } else {
        status.partner_name.as_str()
    };
    format!(
        "{} with {} quality={:.0} {} last_sync={} pending={} conflicts={}",
        status.relationship_id,
        name,
        status.quality.score,
        status.connection_strength.as_str(),
        format_optional_time(status.last_sync, now_ms),
        status.pending_changes.len(),
        status.conflicts.len()
    )
}

pub fn format_sync_result(result: &RelationshipSyncResult) -> String {
    let collections = result
        .synced_collections
        .iter()
        .map(|collection| collection.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let status = if result.success { "ok" } else { "failed" };
    let mut line = format!(
        "{} {status} [{collections}] conflicts={}/{} {}ms {}B",
        result.relationship_id,
        result.conflicts_resolved,
        result.conflicts_found,
        result.duration_ms,
        result.bytes_transferred
    );
    if let Some(error) = &result.error {
        line.push_str(&format!(" ({error})"));
    }
    line
}
