//! Relationship-scoped sync orchestration.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use super::conflicts::ConflictManager;
use super::gate::{CollectionSyncRequest, RemoteDivergence, RemoteSyncGate};
use super::locks::ScopeLocks;
use super::queue::{FlushReport, MutationQueue};
use super::state::{SyncProgress, SyncState};
use crate::error::{Error, Result};
use crate::models::{
    ConnectionStrength, DataConflict, PendingChange, RelationshipSyncResult,
    RelationshipSyncStatus, SyncCollection, SyncQuality,
};
use crate::services::LocalStore;
use crate::util::now_millis;

/// Integrity points lost per conflict still open after a sync
const INTEGRITY_PENALTY_PER_CONFLICT: f64 = 10.0;

/// Outcome of a full sync cycle for the session user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSyncReport {
    pub state: SyncState,
    pub flush: FlushReport,
    pub synced_collections: Vec<SyncCollection>,
    pub failed_collections: Vec<SyncCollection>,
    pub conflicts_found: usize,
    pub bytes_transferred: u64,
    pub duration_ms: u64,
}

/// Collections that came back from a round of gate calls
#[derive(Default)]
struct CollectionRound {
    synced: Vec<SyncCollection>,
    failed: Vec<SyncCollection>,
    bytes: u64,
    divergences: Vec<RemoteDivergence>,
}

/// Tracks one status per owner/keyholder pairing and drives syncs for it.
#[derive(Clone)]
pub struct RelationshipOrchestrator {
    store: LocalStore,
    gate: Arc<dyn RemoteSyncGate>,
    queue: MutationQueue,
    conflicts: ConflictManager,
    user_id: String,
    latency_budget_ms: u64,
    in_flight: Arc<ScopeLocks<String>>,
    cycle: Arc<Mutex<()>>,
    progress: Arc<watch::Sender<SyncProgress>>,
}

impl RelationshipOrchestrator {
    pub fn new(
        store: LocalStore,
        gate: Arc<dyn RemoteSyncGate>,
        queue: MutationQueue,
        conflicts: ConflictManager,
        user_id: impl Into<String>,
    ) -> Self {
        let (progress, _) = watch::channel(SyncProgress::default());
        Self {
            store,
            gate,
            queue,
            conflicts,
            user_id: user_id.into(),
            latency_budget_ms: 10_000,
            in_flight: Arc::new(ScopeLocks::new()),
            cycle: Arc::new(Mutex::new(())),
            progress: Arc::new(progress),
        }
    }

    #[must_use]
    pub const fn with_latency_budget_ms(mut self, latency_budget_ms: u64) -> Self {
        self.latency_budget_ms = latency_budget_ms;
        self
    }

    /// Subscribe to full-cycle progress updates.
    pub fn progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    pub fn current_progress(&self) -> SyncProgress {
        self.progress.borrow().clone()
    }

    // -- relationship lifecycle ---------------------------------------------

    /// Start tracking a relationship. Re-adding an existing one refreshes the
    /// partner details and keeps its sync history.
    pub async fn add_relationship(
        &self,
        relationship_id: &str,
        partner_id: &str,
        partner_name: &str,
    ) -> Result<RelationshipSyncStatus> {
        let relationship_id = relationship_id.trim();
        let partner_id = partner_id.trim();
        if relationship_id.is_empty() || partner_id.is_empty() {
            return Err(Error::InvalidInput(
                "relationship id and partner id are required".into(),
            ));
        }

        let existing = self
            .store
            .get_relationship(&self.user_id, relationship_id)
            .await?;
        let status = match existing {
            Some(mut existing) => {
                existing.partner_id = partner_id.to_string();
                existing.partner_name = partner_name.trim().to_string();
                existing
            }
            None => {
                let mut status = RelationshipSyncStatus::new(
                    relationship_id,
                    partner_id,
                    partner_name.trim(),
                    now_millis(),
                );
                status.pending_changes = self.pending_changes().await?;
                status
            }
        };

        self.store.upsert_relationship(&self.user_id, &status).await?;
        tracing::info!("Tracking relationship {relationship_id} with {partner_id}");
        Ok(status)
    }

    /// Stop tracking a relationship that ended.
    pub async fn remove_relationship(&self, relationship_id: &str) -> Result<()> {
        if !self
            .store
            .delete_relationship(&self.user_id, relationship_id)
            .await?
        {
            return Err(Error::RelationshipNotFound(relationship_id.to_string()));
        }
        tracing::info!("Stopped tracking relationship {relationship_id}");
        Ok(())
    }

    pub async fn relationship(&self, relationship_id: &str) -> Result<RelationshipSyncStatus> {
        self.store
            .get_relationship(&self.user_id, relationship_id)
            .await?
            .ok_or_else(|| Error::RelationshipNotFound(relationship_id.to_string()))
    }

    pub async fn relationships(&self) -> Result<Vec<RelationshipSyncStatus>> {
        self.store.list_relationships(&self.user_id).await
    }

    /// Mean quality across relationships; 100 when none are tracked.
    #[allow(clippy::cast_precision_loss)]
    pub async fn sync_quality(&self) -> Result<f64> {
        let relationships = self.relationships().await?;
        if relationships.is_empty() {
            return Ok(100.0);
        }
        let total: f64 = relationships.iter().map(|status| status.quality.score).sum();
        Ok(total / relationships.len() as f64)
    }

    /// Queued changes of the session user that touch shareable collections.
    pub async fn pending_changes(&self) -> Result<Vec<PendingChange>> {
        let pending = self.queue.pending_for_owner(&self.user_id).await?;
        Ok(pending
            .into_iter()
            .filter(|operation| {
                SyncCollection::SHAREABLE
                    .iter()
                    .any(|collection| collection.as_str() == operation.collection)
            })
            .map(|operation| PendingChange {
                operation_id: operation.id,
                collection: operation.collection,
                kind: operation.kind,
                queued_at: operation.created_at,
            })
            .collect())
    }

    /// Flush the session user's queue. Divergences the remote reports
    /// become active conflicts.
    pub async fn flush_pending(&self) -> Result<FlushReport> {
        let report = self.queue.flush_owner(&self.user_id).await?;
        self.conflicts
            .register_divergences(None, &report.divergences())
            .await?;
        Ok(report)
    }

    // -- relationship sync --------------------------------------------------

    /// Sync the shared collections of one relationship.
    ///
    /// Only an unknown relationship is an error; anything that goes wrong
    /// afterwards is reported as a failed result. A second call for the same
    /// relationship waits for the one in flight.
    pub async fn sync_relationship(&self, relationship_id: &str) -> Result<RelationshipSyncResult> {
        let status = self.relationship(relationship_id).await?;
        let _in_flight = self.in_flight.acquire(&status.relationship_id).await;

        let started = Instant::now();
        match self.run_relationship_sync(status, started).await {
            Ok(result) => Ok(result),
            Err(error) => {
                tracing::warn!("Relationship sync {relationship_id} failed: {error}");
                if let Err(metrics_error) = self
                    .store
                    .update_metrics(&self.user_id, |metrics| {
                        metrics.record_attempt(false, 0, now_millis());
                    })
                    .await
                {
                    tracing::warn!("Could not record failed sync: {metrics_error}");
                }
                let mut result = RelationshipSyncResult::failed(relationship_id, error.to_string());
                result.duration_ms = elapsed_ms(started);
                Ok(result)
            }
        }
    }

    /// Sync every relationship, isolating per-relationship failures.
    pub async fn sync_all_relationships(&self) -> Result<Vec<RelationshipSyncResult>> {
        let relationships = self.relationships().await?;
        let mut results = Vec::with_capacity(relationships.len());
        for status in relationships {
            let result = match self.sync_relationship(&status.relationship_id).await {
                Ok(result) => result,
                Err(error) => RelationshipSyncResult::failed(&status.relationship_id, error.to_string()),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn run_relationship_sync(
        &self,
        mut status: RelationshipSyncStatus,
        started: Instant,
    ) -> Result<RelationshipSyncResult> {
        let relationship_id = status.relationship_id.clone();
        let permissions = self.store.load_permissions(&self.user_id).await?;
        let allowed = permissions.filter_shared(&SyncCollection::SHAREABLE);
        let skipped: Vec<SyncCollection> = SyncCollection::SHAREABLE
            .into_iter()
            .filter(|collection| !allowed.contains(collection))
            .collect();

        let round = self
            .sync_collections(&allowed, Some(&relationship_id), |_, _| {})
            .await;

        let found = self
            .conflicts
            .register_divergences(Some(&relationship_id), &round.divergences)
            .await?;
        let resolved = if permissions.auto_resolve_conflicts {
            self.conflicts.auto_resolve(&found).await
        } else {
            Vec::new()
        };

        let success = round.failed.is_empty();
        let duration_ms = elapsed_ms(started);
        let now = now_millis();
        let open_conflicts: Vec<DataConflict> =
            self.conflicts.list_for_relationship(&relationship_id).await?;

        let reliability = collection_reliability(round.synced.len(), allowed.len());
        #[allow(clippy::cast_precision_loss)]
        let integrity = (open_conflicts.len() as f64)
            .mul_add(-INTEGRITY_PENALTY_PER_CONFLICT, 100.0)
            .max(0.0);

        status.quality =
            SyncQuality::measure(duration_ms, reliability, integrity, self.latency_budget_ms, now);
        status.connection_strength = if allowed.is_empty() {
            status.connection_strength
        } else {
            ConnectionStrength::estimate(reliability, duration_ms)
        };
        status.is_online = status.connection_strength != ConnectionStrength::Offline;
        if success {
            status.last_sync = Some(now);
        }
        status.conflicts = open_conflicts.iter().map(|conflict| conflict.id).collect();
        status.pending_changes = self.pending_changes().await?;
        self.store.upsert_relationship(&self.user_id, &status).await?;

        self.store
            .update_metrics(&self.user_id, |metrics| {
                metrics.record_attempt(success, round.bytes, now);
            })
            .await?;

        let error = (!success).then(|| {
            format!(
                "sync failed for: {}",
                round
                    .failed
                    .iter()
                    .map(|collection| collection.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        });

        tracing::info!(
            "Relationship {relationship_id} synced {}/{} collections in {duration_ms}ms (quality {:.0})",
            round.synced.len(),
            allowed.len(),
            status.quality.score
        );

        Ok(RelationshipSyncResult {
            relationship_id,
            success,
            synced_collections: round.synced,
            skipped_collections: skipped,
            conflicts_found: found.len(),
            conflicts_resolved: resolved.len(),
            duration_ms,
            bytes_transferred: round.bytes,
            error,
        })
    }

    /// Call the gate for each collection; failures are collected, not raised.
    async fn sync_collections(
        &self,
        collections: &[SyncCollection],
        relationship_id: Option<&str>,
        mut on_done: impl FnMut(usize, SyncCollection) + Send,
    ) -> CollectionRound {
        let mut round = CollectionRound::default();
        for (index, collection) in collections.iter().copied().enumerate() {
            let mut request = CollectionSyncRequest::new(collection.as_str(), &self.user_id);
            if let Some(relationship_id) = relationship_id {
                request = request.with_relationship(relationship_id);
            }

            match self.gate.sync_collection(&request).await {
                Ok(outcome) => {
                    round.synced.push(collection);
                    round.bytes = round.bytes.saturating_add(outcome.bytes_transferred);
                    round.divergences.extend(outcome.divergences);
                }
                Err(error) => {
                    tracing::warn!("Sync of {collection} for {} failed: {error}", self.user_id);
                    round.failed.push(collection);
                }
            }
            on_done(index, collection);
        }
        round
    }

    // -- full cycle ---------------------------------------------------------

    /// Flush the queue and sync every collection of the session user.
    ///
    /// Progress moves `idle -> syncing -> completed | error` and always ends
    /// in a terminal state. Concurrent calls run one after another.
    pub async fn force_sync_all(&self) -> Result<FullSyncReport> {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        self.progress
            .send_replace(SyncProgress::syncing(0.0, "flushing pending changes"));

        match self.run_full_cycle(started).await {
            Ok(report) => {
                let progress = if report.state == SyncState::Completed {
                    SyncProgress::completed()
                } else {
                    SyncProgress::error(1.0, "some collections failed to sync")
                };
                self.progress.send_replace(progress);
                Ok(report)
            }
            Err(error) => {
                let reached = self.progress.borrow().progress;
                self.progress
                    .send_replace(SyncProgress::error(reached, error.to_string()));
                Err(error)
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn run_full_cycle(&self, started: Instant) -> Result<FullSyncReport> {
        let flush = self.queue.flush_owner(&self.user_id).await?;

        let collections = SyncCollection::ALL;
        let steps = (collections.len() + 1) as f64;
        self.progress.send_replace(SyncProgress::syncing(
            1.0 / steps,
            "syncing collections",
        ));

        let progress = Arc::clone(&self.progress);
        let round = self
            .sync_collections(&collections, None, move |index, collection| {
                progress.send_replace(SyncProgress::syncing(
                    (index + 2) as f64 / steps,
                    format!("synced {collection}"),
                ));
            })
            .await;

        let mut divergences = flush.divergences();
        divergences.extend(round.divergences);
        let found = self
            .conflicts
            .register_divergences(None, &divergences)
            .await?;

        let success = round.failed.is_empty() && flush.is_clean();
        let now = now_millis();
        self.store
            .update_metrics(&self.user_id, |metrics| {
                metrics.record_attempt(success, round.bytes, now);
            })
            .await?;

        let duration_ms = elapsed_ms(started);
        tracing::info!(
            "Full sync for {} finished in {duration_ms}ms: {} synced, {} failed, {} conflicts",
            self.user_id,
            round.synced.len(),
            round.failed.len(),
            found.len()
        );

        Ok(FullSyncReport {
            state: if success {
                SyncState::Completed
            } else {
                SyncState::Error
            },
            flush,
            synced_collections: round.synced,
            failed_collections: round.failed,
            conflicts_found: found.len(),
            bytes_transferred: round.bytes,
            duration_ms,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn collection_reliability(synced: usize, attempted: usize) -> f64 {
    if attempted == 0 {
        return 100.0;
    }
    synced as f64 / attempted as f64 * 100.0
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictType, EntityKind, NewOperation, OperationKind, PrivacyLevel};
    use crate::sync::gate::CollectionSyncOutcome;
    use crate::sync::testing::{ScriptedGate, Step};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Harness {
        store: LocalStore,
        gate: Arc<ScriptedGate>,
        queue: MutationQueue,
        conflicts: ConflictManager,
        orchestrator: RelationshipOrchestrator,
    }

    async fn harness(gate: ScriptedGate) -> Harness {
        let store = LocalStore::open_in_memory().await.unwrap();
        let gate = Arc::new(gate);
        let queue = MutationQueue::new(store.clone(), gate.clone());
        let conflicts = ConflictManager::new(store.clone(), "u1");
        let orchestrator = RelationshipOrchestrator::new(
            store.clone(),
            gate.clone(),
            queue.clone(),
            conflicts.clone(),
            "u1",
        );
        Harness {
            store,
            gate,
            queue,
            conflicts,
            orchestrator,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quality_is_perfect_without_relationships() {
        let h = harness(ScriptedGate::always_ok()).await;
        assert!((h.orchestrator.sync_quality().await.unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_relationship_is_an_error() {
        let h = harness(ScriptedGate::always_ok()).await;
        assert!(matches!(
            h.orchestrator.sync_relationship("missing").await,
            Err(Error::RelationshipNotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn events_are_skipped_unless_shared() {
        let h = harness(ScriptedGate::always_ok()).await;
        h.orchestrator.add_relationship("rel-1", "kh", "Keyholder").await.unwrap();

        let result = h.orchestrator.sync_relationship("rel-1").await.unwrap();

        assert!(result.success);
        assert_eq!(
            result.synced_collections,
            vec![SyncCollection::Sessions, SyncCollection::Goals, SyncCollection::Tasks]
        );
        assert_eq!(result.skipped_collections, vec![SyncCollection::Events]);
        assert!(h.gate.calls_for("events").is_empty());
        assert!(h
            .gate
            .calls()
            .iter()
            .all(|call| call.relationship_id.as_deref() == Some("rel-1")));

        let metrics = h.store.load_metrics("u1").await.unwrap();
        assert_eq!(metrics.successful_syncs, 1);
        let status = h.orchestrator.relationship("rel-1").await.unwrap();
        assert!(status.last_sync.is_some());
        assert!(status.is_online);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn private_users_share_nothing() {
        let h = harness(ScriptedGate::always_ok()).await;
        let mut permissions = h.store.load_permissions("u1").await.unwrap();
        permissions.privacy_level = PrivacyLevel::Private;
        h.store.save_permissions(&permissions).await.unwrap();
        h.orchestrator.add_relationship("rel-1", "kh", "Keyholder").await.unwrap();

        let result = h.orchestrator.sync_relationship("rel-1").await.unwrap();

        assert!(result.synced_collections.is_empty());
        assert_eq!(result.skipped_collections.len(), 4);
        assert!(h.gate.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_failure_yields_failed_result_not_error() {
        let h = harness(ScriptedGate::always_fail()).await;
        h.orchestrator.add_relationship("rel-1", "kh", "Keyholder").await.unwrap();

        let result = h.orchestrator.sync_relationship("rel-1").await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("sessions"));
        let metrics = h.store.load_metrics("u1").await.unwrap();
        assert_eq!(metrics.failed_syncs, 1);
        assert!(metrics.reliability_score < 1.0);

        let status = h.orchestrator.relationship("rel-1").await.unwrap();
        assert_eq!(status.last_sync, None);
        assert_eq!(status.connection_strength, ConnectionStrength::Offline);
        assert!(h.orchestrator.sync_quality().await.unwrap() < 100.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn divergences_are_registered_and_low_ones_auto_resolved() {
        let h = harness(ScriptedGate::always_ok()).await;
        h.gate.push(
            "tasks",
            Step::Ok(CollectionSyncOutcome {
                bytes_transferred: 100,
                divergences: vec![
                    RemoteDivergence {
                        conflict_type: ConflictType::DataModified,
                        entity_kind: EntityKind::Task,
                        entity_id: "t1".into(),
                        local: json!({"a": 1}),
                        remote: json!({"b": 2}),
                        keyholder: None,
                        last_modified_by: None,
                    },
                    RemoteDivergence {
                        conflict_type: ConflictType::PrivacyViolation,
                        entity_kind: EntityKind::Task,
                        entity_id: "t2".into(),
                        local: json!({}),
                        remote: json!({"leak": true}),
                        keyholder: None,
                        last_modified_by: Some("kh".into()),
                    },
                ],
            }),
        );
        h.orchestrator.add_relationship("rel-1", "kh", "Keyholder").await.unwrap();

        let result = h.orchestrator.sync_relationship("rel-1").await.unwrap();

        assert_eq!(result.conflicts_found, 2);
        assert_eq!(result.conflicts_resolved, 1);
        assert_eq!(result.bytes_transferred, 100);

        let status = h.orchestrator.relationship("rel-1").await.unwrap();
        assert_eq!(status.conflicts.len(), 1);
        assert!(status.quality.data_integrity < 100.0);
        assert_eq!(h.conflicts.active_count().await.unwrap(), 1);
        assert_eq!(h.store.load_metrics("u1").await.unwrap().conflicts_resolved, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_all_isolates_relationships() {
        let h = harness(ScriptedGate::always_ok()).await;
        h.orchestrator.add_relationship("rel-1", "kh1", "One").await.unwrap();
        h.orchestrator.add_relationship("rel-2", "kh2", "Two").await.unwrap();
        h.gate.fail_times("goals", 1);

        let results = h.orchestrator.sync_all_relationships().await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.success).count(), 1);
        let metrics = h.store.load_metrics("u1").await.unwrap();
        assert_eq!(metrics.total_syncs, 2);
        assert_eq!(metrics.failed_syncs, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_changes_track_the_queue() {
        let h = harness(ScriptedGate::always_ok()).await;
        h.queue
            .enqueue(NewOperation::new(OperationKind::Update, "goals", "u1", json!({"id": 1})))
            .await
            .unwrap();
        h.queue
            .enqueue(NewOperation::new(OperationKind::Update, "settings", "u1", json!({})))
            .await
            .unwrap();

        let status = h.orchestrator.add_relationship("rel-1", "kh", "Keyholder").await.unwrap();
        assert_eq!(status.pending_changes.len(), 1);
        assert_eq!(status.pending_changes[0].collection, "goals");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_relationship_requires_existing() {
        let h = harness(ScriptedGate::always_ok()).await;
        h.orchestrator.add_relationship("rel-1", "kh", "Keyholder").await.unwrap();

        h.orchestrator.remove_relationship("rel-1").await.unwrap();
        assert!(matches!(
            h.orchestrator.remove_relationship("rel-1").await,
            Err(Error::RelationshipNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn force_sync_all_completes_and_flushes_queue() {
        let h = harness(ScriptedGate::always_ok()).await;
        h.queue
            .enqueue(NewOperation::new(OperationKind::Create, "tasks", "u1", json!({"n": 1})))
            .await
            .unwrap();
        let progress = h.orchestrator.progress();
        assert_eq!(progress.borrow().state, SyncState::Idle);

        let report = h.orchestrator.force_sync_all().await.unwrap();

        assert_eq!(report.state, SyncState::Completed);
        assert_eq!(report.flush.removed(), 1);
        assert_eq!(report.synced_collections.len(), SyncCollection::ALL.len());
        assert!(h.queue.is_empty().await.unwrap());
        assert_eq!(progress.borrow().state, SyncState::Completed);
        assert!((progress.borrow().progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(h.store.load_metrics("u1").await.unwrap().successful_syncs, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn force_sync_all_ends_in_error_state_on_failures() {
        let h = harness(ScriptedGate::always_fail()).await;

        let report = h.orchestrator.force_sync_all().await.unwrap();

        assert_eq!(report.state, SyncState::Error);
        assert!(h.orchestrator.current_progress().state.is_terminal());
        assert_eq!(h.orchestrator.current_progress().state, SyncState::Error);
        assert_eq!(h.store.load_metrics("u1").await.unwrap().failed_syncs, 1);
    }
}
