//! Shared local store used by every sync component.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    BackupRepository, ConflictRepository, Database, LibSqlBackupRepository,
    LibSqlConflictRepository, LibSqlQueueRepository, LibSqlRecordRepository,
    LibSqlRelationshipRepository, LibSqlSyncStateRepository, QueueRepository, RecordRepository,
    RelationshipRepository, SyncStateRepository,
};
use crate::models::{
    BackupId, BackupInfo, BackupSnapshot, ConflictId, ConflictPriority, DataConflict, EntityKind,
    LocalRecord, NewOperation, OperationId, QueuedOperation, RelationshipSyncStatus,
    SyncMetrics, SyncPermissions,
};
use crate::Result;

/// Thread-safe handle to the local durable store.
///
/// Cloning is cheap; every clone shares the same connection, and each call
/// holds the connection for exactly one repository operation.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::debug!("Opening local store at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem path of the store, `None` when in memory.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    // -- queue ---------------------------------------------------------------

    pub async fn append_operation(
        &self,
        operation: &NewOperation,
        created_at: i64,
    ) -> Result<QueuedOperation> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .append(operation, created_at)
            .await
    }

    /// Write a local record and queue its mutation in one transaction.
    ///
    /// Either both rows land or neither does.
    pub async fn append_operation_with_record(
        &self,
        operation: &NewOperation,
        created_at: i64,
        record: &LocalRecord,
    ) -> Result<QueuedOperation> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let written = async {
            LibSqlRecordRepository::new(conn).upsert(record).await?;
            LibSqlQueueRepository::new(conn)
                .append(operation, created_at)
                .await
        }
        .await;

        match written {
            Ok(queued) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(queued)
            }
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }

    pub async fn pending_operations(&self) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_pending()
            .await
    }

    pub async fn pending_for_owner(&self, owner_id: &str) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_for_owner(owner_id)
            .await
    }

    pub async fn pending_scope(
        &self,
        owner_id: &str,
        collection: &str,
    ) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_scope(owner_id, collection)
            .await
    }

    pub async fn remove_operations(&self, ids: &[OperationId]) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .remove(ids)
            .await
    }

    pub async fn increment_retries(&self, ids: &[OperationId]) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .increment_retries(ids)
            .await
    }

    pub async fn queue_len(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).count().await
    }

    // -- conflicts -----------------------------------------------------------

    pub async fn insert_conflict(&self, owner_id: &str, conflict: &DataConflict) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .insert(owner_id, conflict)
            .await
    }

    pub async fn replace_conflict(&self, owner_id: &str, conflict: &DataConflict) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .replace(owner_id, conflict)
            .await
    }

    pub async fn get_conflict(
        &self,
        owner_id: &str,
        id: &ConflictId,
    ) -> Result<Option<DataConflict>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .get(owner_id, id)
            .await
    }

    pub async fn find_conflict_for_entity(
        &self,
        owner_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        relationship_id: Option<&str>,
    ) -> Result<Option<DataConflict>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .find_for_entity(owner_id, entity_kind, entity_id, relationship_id)
            .await
    }

    pub async fn list_conflicts(&self, owner_id: &str) -> Result<Vec<DataConflict>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .list(owner_id)
            .await
    }

    pub async fn list_conflicts_for_relationship(
        &self,
        owner_id: &str,
        relationship_id: &str,
    ) -> Result<Vec<DataConflict>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .list_for_relationship(owner_id, relationship_id)
            .await
    }

    pub async fn delete_conflict(&self, owner_id: &str, id: &ConflictId) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .delete(owner_id, id)
            .await
    }

    pub async fn conflict_counts(&self, owner_id: &str) -> Result<Vec<(ConflictPriority, u64)>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .count_by_priority(owner_id)
            .await
    }

    // -- relationships -------------------------------------------------------

    pub async fn upsert_relationship(
        &self,
        owner_id: &str,
        status: &RelationshipSyncStatus,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRelationshipRepository::new(db.connection())
            .upsert(owner_id, status)
            .await
    }

    pub async fn get_relationship(
        &self,
        owner_id: &str,
        relationship_id: &str,
    ) -> Result<Option<RelationshipSyncStatus>> {
        let db = self.db.lock().await;
        LibSqlRelationshipRepository::new(db.connection())
            .get(owner_id, relationship_id)
            .await
    }

    pub async fn list_relationships(&self, owner_id: &str) -> Result<Vec<RelationshipSyncStatus>> {
        let db = self.db.lock().await;
        LibSqlRelationshipRepository::new(db.connection())
            .list(owner_id)
            .await
    }

    pub async fn delete_relationship(&self, owner_id: &str, relationship_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRelationshipRepository::new(db.connection())
            .delete(owner_id, relationship_id)
            .await
    }

    // -- permissions & metrics -----------------------------------------------

    pub async fn load_permissions(&self, user_id: &str) -> Result<SyncPermissions> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .load_permissions(user_id)
            .await
    }

    pub async fn save_permissions(&self, permissions: &SyncPermissions) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .save_permissions(permissions)
            .await
    }

    pub async fn load_metrics(&self, user_id: &str) -> Result<SyncMetrics> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .load_metrics(user_id)
            .await
    }

    /// Read-modify-write of one user's metrics under a single lock.
    pub async fn update_metrics(
        &self,
        user_id: &str,
        update: impl FnOnce(&mut SyncMetrics) + Send,
    ) -> Result<SyncMetrics> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        let mut metrics = repo.load_metrics(user_id).await?;
        update(&mut metrics);
        repo.save_metrics(&metrics).await?;
        Ok(metrics)
    }

    pub async fn reset_metrics(&self, user_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .reset_metrics(user_id)
            .await
    }

    // -- local dataset -------------------------------------------------------

    pub async fn upsert_record(&self, record: &LocalRecord) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .upsert(record)
            .await
    }

    pub async fn get_record(
        &self,
        owner_id: &str,
        collection: &str,
        record_id: &str,
    ) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .get(owner_id, collection, record_id)
            .await
    }

    pub async fn list_records(&self, owner_id: &str, collection: &str) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list_collection(owner_id, collection)
            .await
    }

    pub async fn record_counts(&self, owner_id: &str) -> Result<Vec<(String, u64)>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .count_by_collection(owner_id)
            .await
    }

    // -- backups -------------------------------------------------------------

    pub async fn insert_backup(&self, info: &BackupInfo, snapshot: &BackupSnapshot) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .insert(info, snapshot)
            .await
    }

    pub async fn get_backup(
        &self,
        owner_id: &str,
        id: &BackupId,
    ) -> Result<Option<(BackupInfo, BackupSnapshot)>> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .get(owner_id, id)
            .await
    }

    pub async fn list_backups(&self, owner_id: &str) -> Result<Vec<BackupInfo>> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .list(owner_id)
            .await
    }

    pub async fn delete_expired_backups(&self, now: i64) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlBackupRepository::new(db.connection())
            .delete_expired(now)
            .await
    }
}
