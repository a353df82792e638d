//! One user's sync session: every component, wired explicitly.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::SyncEngineConfig;
use crate::error::{Error, Result};
use crate::models::{
    LocalRecord, NewOperation, OperationKind, QueuedOperation, SyncHealthReport, SyncMetrics,
    SyncPermissions,
};
use crate::sync::{
    assess_health, collect_statistics, spawn_reconnect_flush, BackupService, ConflictManager,
    ConnectivityMonitor, FlushReport, MutationQueue, RealtimeSync, RelationshipOrchestrator,
    RemoteSyncGate, SyncStatistics,
};
use crate::util::now_millis;

use super::LocalStore;

/// Owns the queue, conflict set, relationships, backups and background
/// tasks of one signed-in user.
pub struct SyncSession {
    user_id: String,
    config: SyncEngineConfig,
    store: LocalStore,
    queue: MutationQueue,
    conflicts: ConflictManager,
    relationships: RelationshipOrchestrator,
    backups: BackupService,
    realtime: RealtimeSync,
    connectivity: ConnectivityMonitor,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

impl SyncSession {
    pub fn new(
        store: LocalStore,
        gate: Arc<dyn RemoteSyncGate>,
        user_id: impl Into<String>,
        config: SyncEngineConfig,
    ) -> Result<Self> {
        let user_id = user_id.into().trim().to_string();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("user id cannot be empty".into()));
        }
        config.validate().map_err(Error::InvalidConfig)?;

        let queue = MutationQueue::new(store.clone(), Arc::clone(&gate))
            .with_max_retry_count(config.max_retry_count);
        let conflicts = ConflictManager::new(store.clone(), &user_id);
        let relationships = RelationshipOrchestrator::new(
            store.clone(),
            gate,
            queue.clone(),
            conflicts.clone(),
            &user_id,
        )
        .with_latency_budget_ms(config.latency_budget_ms);
        let backups = BackupService::new(store.clone(), queue.clone(), conflicts.clone(), &user_id)
            .with_retention_days(config.backup_retention_days);
        let realtime =
            RealtimeSync::new(store.clone(), relationships.clone(), &user_id);

        Ok(Self {
            user_id,
            config,
            store,
            queue,
            conflicts,
            relationships,
            backups,
            realtime,
            connectivity: ConnectivityMonitor::new(true),
            reconnect: Mutex::new(None),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub const fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub const fn conflicts(&self) -> &ConflictManager {
        &self.conflicts
    }

    pub const fn relationships(&self) -> &RelationshipOrchestrator {
        &self.relationships
    }

    pub const fn backups(&self) -> &BackupService {
        &self.backups
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Write a record locally and queue the mutation for sync, atomically.
    ///
    /// Deletes are soft so the tombstone can sync. The payload always
    /// carries the record id.
    pub async fn record_mutation(
        &self,
        kind: OperationKind,
        collection: &str,
        record_id: &str,
        data: Value,
    ) -> Result<QueuedOperation> {
        let record_id = record_id.trim();
        if record_id.is_empty() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }

        let mut payload = data;
        if let Value::Object(fields) = &mut payload {
            fields
                .entry("id")
                .or_insert_with(|| Value::String(record_id.to_string()));
        }

        let operation = NewOperation::new(kind, collection, &self.user_id, payload.clone());
        let record = LocalRecord {
            collection: collection.to_string(),
            record_id: record_id.to_string(),
            owner_id: self.user_id.clone(),
            data: payload,
            updated_at: now_millis(),
            is_deleted: kind == OperationKind::Delete,
        };

        self.queue.enqueue_with_record(operation, &record).await
    }

    /// Flush the session user's pending operations.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.relationships.flush_pending().await
    }

    pub async fn health(&self) -> Result<SyncHealthReport> {
        let conflicts = self.conflicts.list().await?;
        let metrics = self.store.load_metrics(&self.user_id).await?;
        Ok(assess_health(&conflicts, &metrics, &self.config, now_millis()))
    }

    pub async fn statistics(&self) -> Result<SyncStatistics> {
        collect_statistics(&self.store, &self.user_id).await
    }

    pub async fn permissions(&self) -> Result<SyncPermissions> {
        self.store.load_permissions(&self.user_id).await
    }

    /// Persist new permissions and re-establish the real-time trigger.
    pub async fn update_permissions(&self, mut permissions: SyncPermissions) -> Result<SyncPermissions> {
        if permissions.user_id != self.user_id {
            return Err(Error::InvalidInput(format!(
                "permissions belong to '{}', not '{}'",
                permissions.user_id, self.user_id
            )));
        }

        permissions.updated_at = now_millis();
        self.store.save_permissions(&permissions).await?;
        self.realtime.reconfigure().await?;
        tracing::info!(
            "Updated sync permissions for {} ({:?}, realtime {})",
            self.user_id,
            permissions.privacy_level,
            permissions.realtime_enabled
        );
        Ok(permissions)
    }

    pub async fn metrics(&self) -> Result<SyncMetrics> {
        self.store.load_metrics(&self.user_id).await
    }

    /// Explicit wipe; the only way counters go down.
    pub async fn reset_metrics(&self) -> Result<()> {
        self.store.reset_metrics(&self.user_id).await?;
        tracing::info!("Reset sync metrics for {}", self.user_id);
        Ok(())
    }

    /// Start the reconnect flush task and, if enabled, real-time sync.
    pub async fn start_background(&self) -> Result<()> {
        {
            let mut reconnect = self.reconnect.lock().unwrap_or_else(PoisonError::into_inner);
            if reconnect.is_none() {
                *reconnect = Some(spawn_reconnect_flush(
                    self.queue.clone(),
                    self.conflicts.clone(),
                    &self.connectivity,
                ));
            }
        }
        self.realtime.reconfigure().await?;
        Ok(())
    }

    pub fn is_realtime_running(&self) -> bool {
        self.realtime.is_running()
    }

    /// Stop every background task.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .reconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.realtime.stop();
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConflictContext, ConflictType, ConflictVersions, EntityKind, HealthStatus, NewConflict,
    };
    use crate::sync::testing::ScriptedGate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn session(gate: ScriptedGate) -> SyncSession {
        let store = LocalStore::open_in_memory().await.unwrap();
        SyncSession::new(store, Arc::new(gate), "u1", SyncEngineConfig::default()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_blank_user_and_invalid_config() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let gate: Arc<dyn RemoteSyncGate> = Arc::new(ScriptedGate::always_ok());

        assert!(matches!(
            SyncSession::new(store.clone(), Arc::clone(&gate), " ", SyncEngineConfig::default()),
            Err(Error::InvalidInput(_))
        ));
        let config = SyncEngineConfig {
            latency_budget_ms: 0,
            ..SyncEngineConfig::default()
        };
        assert!(matches!(
            SyncSession::new(store, gate, "u1", config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_mutation_writes_record_and_queues_operation() {
        let session = session(ScriptedGate::always_ok()).await;

        let queued = session
            .record_mutation(OperationKind::Create, "tasks", "t1", json!({"title": "Walk"}))
            .await
            .unwrap();

        assert_eq!(queued.payload, json!({"id": "t1", "title": "Walk"}));
        let record = session.store().get_record("u1", "tasks", "t1").await.unwrap().unwrap();
        assert_eq!(record.data["title"], "Walk");
        assert!(!record.is_deleted);

        session
            .record_mutation(OperationKind::Delete, "tasks", "t1", json!({}))
            .await
            .unwrap();
        let record = session.store().get_record("u1", "tasks", "t1").await.unwrap().unwrap();
        assert!(record.is_deleted);
        assert_eq!(session.queue().len().await.unwrap(), 2);

        let report = session.flush().await.unwrap();
        assert_eq!(report.removed(), 2);
        assert_eq!(session.metrics().await.unwrap().total_syncs, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sessions_sharing_a_store_stay_isolated() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let gate: Arc<dyn RemoteSyncGate> = Arc::new(ScriptedGate::always_ok());
        let first =
            SyncSession::new(store.clone(), Arc::clone(&gate), "u1", SyncEngineConfig::default())
                .unwrap();
        let second = SyncSession::new(store, gate, "u2", SyncEngineConfig::default()).unwrap();

        first
            .record_mutation(OperationKind::Create, "tasks", "t1", json!({"title": "mine"}))
            .await
            .unwrap();
        second
            .record_mutation(OperationKind::Create, "tasks", "t1", json!({"secret": 1}))
            .await
            .unwrap();
        first
            .conflicts()
            .register(NewConflict::new(
                ConflictType::PrivacyViolation,
                EntityKind::Task,
                "t1",
                ConflictVersions::new(json!({"secret": 1}), json!({})),
                ConflictContext::for_user("u1"),
            ))
            .await
            .unwrap();
        first
            .relationships()
            .add_relationship("rel-1", "kh-1", "Keyholder")
            .await
            .unwrap();

        let mine = first.store().get_record("u1", "tasks", "t1").await.unwrap().unwrap();
        assert_eq!(mine.data["title"], "mine");
        assert_eq!(first.backups().create_backup().await.unwrap().record_count, 1);

        assert!(second.conflicts().list().await.unwrap().is_empty());
        assert_eq!(second.health().await.unwrap().status, HealthStatus::Healthy);
        assert!(second.relationships().relationships().await.unwrap().is_empty());
        assert_eq!(second.statistics().await.unwrap().total_conflicts(), 0);
        assert_eq!(first.health().await.unwrap().status, HealthStatus::Critical);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_reflects_conflicts_and_metrics() {
        let session = session(ScriptedGate::always_ok()).await;
        assert_eq!(session.health().await.unwrap().status, HealthStatus::Healthy);

        session
            .conflicts()
            .register(NewConflict::new(
                ConflictType::PrivacyViolation,
                EntityKind::Event,
                "e1",
                ConflictVersions::new(json!({}), json!({"visible": true})),
                ConflictContext::for_user("u1"),
            ))
            .await
            .unwrap();

        let report = session.health().await.unwrap();
        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(report.active_conflicts, 1);
        assert_eq!(session.statistics().await.unwrap().total_conflicts(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permission_changes_toggle_realtime() {
        let session = session(ScriptedGate::always_ok()).await;
        session.start_background().await.unwrap();
        assert!(!session.is_realtime_running());

        let mut permissions = session.permissions().await.unwrap();
        permissions.realtime_enabled = true;
        let saved = session.update_permissions(permissions).await.unwrap();
        assert!(saved.updated_at > 0);
        assert!(session.is_realtime_running());

        let mut permissions = session.permissions().await.unwrap();
        permissions.realtime_enabled = false;
        session.update_permissions(permissions).await.unwrap();
        assert!(!session.is_realtime_running());

        session.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permissions_for_another_user_are_rejected() {
        let session = session(ScriptedGate::always_ok()).await;
        let result = session
            .update_permissions(SyncPermissions::defaults_for("someone-else"))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_metrics_wipes_counters() {
        let session = session(ScriptedGate::always_ok()).await;
        session.relationships().force_sync_all().await.unwrap();
        assert_eq!(session.metrics().await.unwrap().total_syncs, 1);

        session.reset_metrics().await.unwrap();
        assert_eq!(session.metrics().await.unwrap(), SyncMetrics::empty("u1"));
    }
}
