use pact_core::models::{BackupId, BackupInfo};

use crate::commands::common::{format_timestamp, open_session, print_json, SessionArgs};
use crate::error::CliError;

pub async fn run_backup_create(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let info = session.backups().create_backup().await?;

    if as_json {
        return print_json(&info);
    }
    println!("{}", format_backup_line(&info));
    Ok(())
}

pub async fn run_backup_list(as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let backups = session.backups().list_backups().await?;

    if as_json {
        return print_json(&backups);
    }
    if backups.is_empty() {
        println!("No backups.");
    }
    for info in &backups {
        println!("{}", format_backup_line(info));
    }
    Ok(())
}

pub async fn run_backup_restore(id: &str, as_json: bool, args: &SessionArgs) -> Result<(), CliError> {
    let id: BackupId = id
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("invalid backup id '{id}'")))?;
    let session = open_session(args).await?;
    let report = session.backups().restore_from_backup(&id).await?;

    if as_json {
        return print_json(&report);
    }
    println!(
        "Restored {} record(s), {} unchanged, {} conflict(s) raised",
        report.restored_records,
        report.unchanged_records,
        report.conflicts_created.len()
    );
    Ok(())
}

pub async fn run_backup_prune(args: &SessionArgs) -> Result<(), CliError> {
    let session = open_session(args).await?;
    let removed = session.backups().prune_expired_backups().await?;
    println!("Removed {removed} expired backup(s)");
    Ok(())
}

pub fn format_backup_line(info: &BackupInfo) -> String {
    format!(
        "{} {} record(s) {}B [{}] created {} expires {}",
        info.id,
        info.record_count,
        info.size_bytes,
        info.collections.join(","),
        format_timestamp(info.created_at),
        format_timestamp(info.expires_at)
    )
}
