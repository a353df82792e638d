//! Pact CLI - inspect and drive the offline-first sync core
//!
//! Every command opens a session for one user against the local database.
//! Commands that talk to the remote need `--remote-url` or `PACT_REMOTE_URL`.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    BackupCommands, Cli, Commands, ConflictCommands, MetricsCommands, PermissionCommands,
    RelationshipCommands,
};
use crate::commands::backup::{
    run_backup_create, run_backup_list, run_backup_prune, run_backup_restore,
};
use crate::commands::common::SessionArgs;
use crate::commands::completions::run_completions;
use crate::commands::conflicts::{run_conflict_resolve, run_conflicts_list, run_resolve_all};
use crate::commands::metrics::{run_metrics_reset, run_metrics_show};
use crate::commands::permissions::{run_permissions_set, run_permissions_show, PermissionChanges};
use crate::commands::queue::{run_enqueue, run_flush, run_queue};
use crate::commands::relationships::{
    run_relationship_add, run_relationship_remove, run_relationship_sync, run_relationships_list,
};
use crate::commands::sync::{run_health, run_stats, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "pact=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let args = SessionArgs::resolve(cli.db_path, cli.user, cli.remote_url, cli.config)?;

    match cli.command {
        Commands::Enqueue {
            kind,
            collection,
            record_id,
            data,
        } => run_enqueue(kind, &collection, &record_id, &data, &args).await?,
        Commands::Queue { json } => run_queue(json, &args).await?,
        Commands::Flush { json } => run_flush(json, &args).await?,
        Commands::Conflicts { command } => match command {
            ConflictCommands::List { json } => run_conflicts_list(json, &args).await?,
            ConflictCommands::Resolve {
                id,
                strategy,
                resolved_by,
                json,
            } => run_conflict_resolve(&id, &strategy, resolved_by, json, &args).await?,
            ConflictCommands::ResolveAll {
                default,
                overrides,
                json,
            } => run_resolve_all(&default, &overrides, json, &args).await?,
        },
        Commands::Relationships { command } => match command {
            RelationshipCommands::List { json } => run_relationships_list(json, &args).await?,
            RelationshipCommands::Add {
                id,
                partner_id,
                name,
            } => run_relationship_add(&id, &partner_id, &name, &args).await?,
            RelationshipCommands::Remove { id } => run_relationship_remove(&id, &args).await?,
            RelationshipCommands::Sync { id, json } => {
                run_relationship_sync(id.as_deref(), json, &args).await?;
            }
        },
        Commands::Sync { json } => run_sync(json, &args).await?,
        Commands::Health { json } => run_health(json, &args).await?,
        Commands::Stats { json } => run_stats(json, &args).await?,
        Commands::Backup { command } => match command {
            BackupCommands::Create { json } => run_backup_create(json, &args).await?,
            BackupCommands::List { json } => run_backup_list(json, &args).await?,
            BackupCommands::Restore { id, json } => run_backup_restore(&id, json, &args).await?,
            BackupCommands::Prune => run_backup_prune(&args).await?,
        },
        Commands::Permissions { command } => match command {
            PermissionCommands::Show { json } => run_permissions_show(json, &args).await?,
            PermissionCommands::Set {
                privacy,
                frequency,
                realtime,
                share_sessions,
                share_goals,
                share_tasks,
                share_events,
                auto_resolve,
            } => {
                let changes = PermissionChanges {
                    privacy,
                    frequency,
                    realtime,
                    share_sessions,
                    share_goals,
                    share_tasks,
                    share_events,
                    auto_resolve,
                };
                run_permissions_set(changes, &args).await?;
            }
        },
        Commands::Metrics { command } => match command {
            MetricsCommands::Show { json } => run_metrics_show(json, &args).await?,
            MetricsCommands::Reset => run_metrics_reset(&args).await?,
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
