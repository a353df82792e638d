//! Snapshot and conflict-generating restore of the local dataset.

use crate::error::{Error, Result};
use crate::models::{
    BackupId, BackupInfo, BackupSnapshot, ConflictContext, ConflictId, ConflictType, ConflictVersions,
    EntityKind, LocalRecord, NewConflict, NewOperation, OperationKind, RestoreReport,
    SyncCollection,
};
use crate::services::LocalStore;
use crate::util::now_millis;

use super::conflicts::ConflictManager;
use super::queue::MutationQueue;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Clone)]
pub struct BackupService {
    store: LocalStore,
    queue: MutationQueue,
    conflicts: ConflictManager,
    user_id: String,
    retention_days: u32,
}

impl BackupService {
    pub fn new(
        store: LocalStore,
        queue: MutationQueue,
        conflicts: ConflictManager,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            conflicts,
            user_id: user_id.into(),
            retention_days: 30,
        }
    }

    #[must_use]
    pub const fn with_retention_days(mut self, retention_days: u32) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// Snapshot the live records of every shareable collection.
    pub async fn create_backup(&self) -> Result<BackupInfo> {
        let mut snapshot = BackupSnapshot::default();
        for collection in SyncCollection::SHAREABLE {
            let records: Vec<LocalRecord> = self
                .store
                .list_records(&self.user_id, collection.as_str())
                .await?
                .into_iter()
                .filter(|record| !record.is_deleted)
                .collect();
            snapshot
                .collections
                .insert(collection.as_str().to_string(), records);
        }

        let size_bytes = u64::try_from(serde_json::to_vec(&snapshot)?.len()).unwrap_or(u64::MAX);
        let created_at = now_millis();
        let info = BackupInfo {
            id: BackupId::new(),
            owner_id: self.user_id.clone(),
            size_bytes,
            collections: snapshot.collections.keys().cloned().collect(),
            record_count: snapshot.record_count(),
            created_at,
            expires_at: created_at
                .saturating_add(i64::from(self.retention_days).saturating_mul(DAY_MS)),
        };

        self.store.insert_backup(&info, &snapshot).await?;
        tracing::info!(
            "Created backup {} ({} records, {} bytes)",
            info.id,
            info.record_count,
            info.size_bytes
        );
        Ok(info)
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.store.list_backups(&self.user_id).await
    }

    /// Delete backups past their expiry; returns how many were removed.
    pub async fn prune_expired_backups(&self) -> Result<u64> {
        let removed = self.store.delete_expired_backups(now_millis()).await?;
        if removed > 0 {
            tracing::info!("Pruned {removed} expired backup(s)");
        }
        Ok(removed)
    }

    /// Restore a backup without overwriting anything.
    ///
    /// Missing records are written back and queued for sync; records that
    /// differ from the snapshot are raised as conflicts with the current
    /// version as `local` and the snapshot as `remote`.
    pub async fn restore_from_backup(&self, id: &BackupId) -> Result<RestoreReport> {
        let not_found = || Error::BackupNotFound(id.to_string());
        let (info, snapshot) = self
            .store
            .get_backup(&self.user_id, id)
            .await?
            .ok_or_else(not_found)?;
        if info.expires_at <= now_millis() {
            return Err(not_found());
        }

        let mut report = RestoreReport {
            backup_id: info.id,
            restored_records: 0,
            unchanged_records: 0,
            conflicts_created: Vec::new(),
        };

        for (collection, records) in &snapshot.collections {
            let entity_kind = EntityKind::for_collection(collection).ok_or_else(|| {
                Error::InvalidInput(format!("backup contains unknown collection '{collection}'"))
            })?;

            for saved in records {
                let current = self
                    .store
                    .get_record(&self.user_id, collection, &saved.record_id)
                    .await?;
                match current {
                    None => {
                        self.restore_record(saved).await?;
                        report.restored_records += 1;
                    }
                    Some(current) if !current.is_deleted && current.data == saved.data => {
                        report.unchanged_records += 1;
                    }
                    Some(current) => {
                        let conflict = self
                            .raise_conflict(info.id, entity_kind, &current, saved)
                            .await?;
                        report.conflicts_created.push(conflict);
                    }
                }
            }
        }

        tracing::info!(
            "Restored backup {}: {} restored, {} unchanged, {} conflicts",
            info.id,
            report.restored_records,
            report.unchanged_records,
            report.conflicts_created.len()
        );
        Ok(report)
    }

    async fn restore_record(&self, saved: &LocalRecord) -> Result<()> {
        let record = LocalRecord {
            updated_at: now_millis(),
            is_deleted: false,
            ..saved.clone()
        };
        let operation = NewOperation::new(
            OperationKind::Create,
            &record.collection,
            &record.owner_id,
            record.data.clone(),
        );
        self.queue.enqueue_with_record(operation, &record).await?;
        Ok(())
    }

    async fn raise_conflict(
        &self,
        backup_id: BackupId,
        entity_kind: EntityKind,
        current: &LocalRecord,
        saved: &LocalRecord,
    ) -> Result<ConflictId> {
        let (conflict_type, local) = if current.is_deleted {
            (ConflictType::DataDeleted, serde_json::Value::Null)
        } else {
            (ConflictType::DataModified, current.data.clone())
        };

        let conflict = self
            .conflicts
            .register(NewConflict::new(
                conflict_type,
                entity_kind,
                &saved.record_id,
                ConflictVersions::new(local, saved.data.clone()),
                ConflictContext::for_user(&self.user_id)
                    .with_reason(format!("restored from backup {backup_id}")),
            ))
            .await?;
        Ok(conflict.id)
    }
}
