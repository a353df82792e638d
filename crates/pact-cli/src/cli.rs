use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pact_core::OperationKind;

#[derive(Parser)]
#[command(name = "pact")]
#[command(about = "Inspect and drive the Pact offline-first sync core")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// User whose session to open (defaults to PACT_USER_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Remote sync base URL (defaults to PACT_REMOTE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub remote_url: Option<String>,

    /// Engine config JSON file (defaults to PACT_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a local mutation and queue it for sync
    Enqueue {
        /// Mutation kind
        #[arg(value_enum)]
        kind: OperationKindArg,
        /// Target collection, e.g. tasks
        collection: String,
        /// Record identifier
        record_id: String,
        /// Post-mutation record as JSON
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// List pending queued operations
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay pending operations against the remote
    Flush {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and resolve conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Manage owner/keyholder relationships
    #[command(alias = "rel")]
    Relationships {
        #[command(subcommand)]
        command: RelationshipCommands,
    },
    /// Flush the queue and sync every collection
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the sync health report
    Health {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show statistics over stored sync state
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create, list, restore and prune backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Show or change sharing permissions
    Permissions {
        #[command(subcommand)]
        command: PermissionCommands,
    },
    /// Show or wipe sync metrics
    Metrics {
        #[command(subcommand)]
        command: MetricsCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OperationKindArg {
    Create,
    Update,
    Delete,
}

impl From<OperationKindArg> for OperationKind {
    fn from(value: OperationKindArg) -> Self {
        match value {
            OperationKindArg::Create => Self::Create,
            OperationKindArg::Update => Self::Update,
            OperationKindArg::Delete => Self::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List active conflicts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve one conflict
    Resolve {
        /// Conflict ID
        id: String,
        /// local_wins, remote_wins, keyholder_wins, merge_intelligent or latest_timestamp
        #[arg(long)]
        strategy: String,
        /// Who made the decision
        #[arg(long)]
        resolved_by: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve every active conflict
    ResolveAll {
        /// Strategy for types without an override
        #[arg(long, default_value = "merge_intelligent")]
        default: String,
        /// Per-type override, e.g. data_deleted=remote_wins
        #[arg(long = "for", value_name = "TYPE=STRATEGY")]
        overrides: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum RelationshipCommands {
    /// List tracked relationships
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start tracking a relationship
    Add {
        /// Relationship ID
        id: String,
        /// Partner user ID
        partner_id: String,
        /// Partner display name
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Stop tracking a relationship
    Remove {
        /// Relationship ID
        id: String,
    },
    /// Sync one relationship, or all when no ID is given
    Sync {
        /// Relationship ID
        id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Snapshot shareable collections
    Create {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List backups
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore a backup, raising conflicts for differing records
    Restore {
        /// Backup ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete expired backups
    Prune,
}

#[derive(Subcommand)]
pub enum PermissionCommands {
    /// Show current permissions
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change permissions; omitted options keep their value
    Set {
        /// public, relationship_only or private
        #[arg(long)]
        privacy: Option<String>,
        /// realtime, frequent, moderate or minimal
        #[arg(long)]
        frequency: Option<String>,
        #[arg(long, value_name = "BOOL")]
        realtime: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        share_sessions: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        share_goals: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        share_tasks: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        share_events: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        auto_resolve: Option<bool>,
    },
}

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Show cumulative counters
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Wipe counters
    Reset,
}
