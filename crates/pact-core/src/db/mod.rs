//! Local durable store for Pact

mod backup_repository;
mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
mod record_repository;
mod relationship_repository;
mod state_repository;
mod values;

pub use backup_repository::{BackupRepository, LibSqlBackupRepository};
pub use conflict_repository::{ConflictRepository, LibSqlConflictRepository};
pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
pub use relationship_repository::{LibSqlRelationshipRepository, RelationshipRepository};
pub use state_repository::{LibSqlSyncStateRepository, SyncStateRepository};
