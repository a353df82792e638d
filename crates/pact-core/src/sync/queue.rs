//! Durable, ordered queue of pending local mutations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::gate::{CollectionSyncOutcome, CollectionSyncRequest, RemoteDivergence, RemoteSyncGate};
use super::locks::ScopeLocks;
use crate::error::{Error, Result};
use crate::models::{LocalRecord, NewOperation, OperationId, QueuedOperation};
use crate::services::LocalStore;
use crate::util::{is_valid_collection_name, now_millis};

/// Replay key: one owner's pending writes to one collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueScope {
    pub owner_id: String,
    pub collection: String,
}

impl QueueScope {
    pub fn new(owner_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            collection: collection.into(),
        }
    }
}

/// How one scope's flush attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFlushStatus {
    /// Nothing was pending when the scope lock was acquired
    Empty,
    /// The remote confirmed the batch and it was removed
    Confirmed,
    /// The remote call failed; the batch stays queued
    Failed,
}

/// Result of flushing one (owner, collection) scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeFlushOutcome {
    pub scope: QueueScope,
    pub status: ScopeFlushStatus,
    /// Operation ids sent to the remote, in replay order
    pub replayed: Vec<OperationId>,
    /// Operations removed after exceeding the retry limit
    pub dropped: Vec<OperationId>,
    /// Highest retry count left in the scope after this attempt
    pub retry_count: u32,
    pub error: Option<String>,
    pub outcome: Option<CollectionSyncOutcome>,
}

impl ScopeFlushOutcome {
    fn empty(scope: QueueScope) -> Self {
        Self {
            scope,
            status: ScopeFlushStatus::Empty,
            replayed: Vec::new(),
            dropped: Vec::new(),
            retry_count: 0,
            error: None,
            outcome: None,
        }
    }
}

/// Aggregate result of a flush
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlushReport {
    pub scopes: Vec<ScopeFlushOutcome>,
}

impl FlushReport {
    /// Operations confirmed and removed
    pub fn removed(&self) -> usize {
        self.scopes
            .iter()
            .filter(|scope| scope.status == ScopeFlushStatus::Confirmed)
            .map(|scope| scope.replayed.len())
            .sum()
    }

    /// Operations left queued after a failed attempt
    pub fn failed(&self) -> usize {
        self.scopes
            .iter()
            .filter(|scope| scope.status == ScopeFlushStatus::Failed)
            .map(|scope| scope.replayed.len() - scope.dropped.len())
            .sum()
    }

    pub fn dropped(&self) -> usize {
        self.scopes.iter().map(|scope| scope.dropped.len()).sum()
    }

    /// Whether every attempted scope was confirmed
    pub fn is_clean(&self) -> bool {
        self.scopes
            .iter()
            .all(|scope| scope.status != ScopeFlushStatus::Failed)
    }

    /// Highest retry count still pending, the input for caller backoff
    pub fn max_retry_count(&self) -> u32 {
        self.scopes
            .iter()
            .filter(|scope| scope.status == ScopeFlushStatus::Failed)
            .map(|scope| scope.retry_count)
            .max()
            .unwrap_or(0)
    }

    /// Divergences reported by confirmed syncs
    pub fn divergences(&self) -> Vec<RemoteDivergence> {
        self.scopes
            .iter()
            .filter_map(|scope| scope.outcome.as_ref())
            .flat_map(|outcome| outcome.divergences.iter().cloned())
            .collect()
    }
}

/// The only component that writes the local queue table.
#[derive(Clone)]
pub struct MutationQueue {
    store: LocalStore,
    gate: Arc<dyn RemoteSyncGate>,
    locks: Arc<ScopeLocks<QueueScope>>,
    last_created_at: Arc<AtomicI64>,
    max_retry_count: Option<u32>,
}

impl MutationQueue {
    pub fn new(store: LocalStore, gate: Arc<dyn RemoteSyncGate>) -> Self {
        Self {
            store,
            gate,
            locks: Arc::new(ScopeLocks::new()),
            last_created_at: Arc::new(AtomicI64::new(0)),
            max_retry_count: None,
        }
    }

    /// Drop operations once they have failed this many times.
    #[must_use]
    pub const fn with_max_retry_count(mut self, max_retry_count: Option<u32>) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    /// Durably append a mutation. Needs no network.
    pub async fn enqueue(&self, operation: NewOperation) -> Result<QueuedOperation> {
        self.append(operation, None).await
    }

    /// Append a mutation together with the local record it produced.
    ///
    /// The record write and the queue entry commit atomically, so a queued
    /// operation never exists without its local record.
    pub async fn enqueue_with_record(
        &self,
        operation: NewOperation,
        record: &LocalRecord,
    ) -> Result<QueuedOperation> {
        if record.owner_id != operation.owner_id || record.collection != operation.collection {
            return Err(Error::InvalidInput(format!(
                "record {}/{} does not match operation scope {}/{}",
                record.owner_id, record.collection, operation.owner_id, operation.collection
            )));
        }
        self.append(operation, Some(record)).await
    }

    async fn append(
        &self,
        operation: NewOperation,
        record: Option<&LocalRecord>,
    ) -> Result<QueuedOperation> {
        if !is_valid_collection_name(&operation.collection) {
            return Err(Error::InvalidInput(format!(
                "invalid collection name '{}'",
                operation.collection
            )));
        }
        if operation.owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("owner id cannot be empty".into()));
        }

        // Never hand out a timestamp older than one already issued, so a
        // clock step backwards cannot reorder replay.
        let now = now_millis();
        let previous = self.last_created_at.fetch_max(now, Ordering::SeqCst);
        let created_at = now.max(previous);

        let appended = match record {
            Some(record) => {
                self.store
                    .append_operation_with_record(&operation, created_at, record)
                    .await
            }
            None => self.store.append_operation(&operation, created_at).await,
        };
        let queued = appended.map_err(|error| Error::Enqueue(error.to_string()))?;

        tracing::debug!(
            "Enqueued {} #{} for {}/{}",
            queued.kind,
            queued.id,
            queued.owner_id,
            queued.collection
        );
        Ok(queued)
    }

    /// All pending operations in replay order.
    pub async fn pending(&self) -> Result<Vec<QueuedOperation>> {
        self.store.pending_operations().await
    }

    pub async fn pending_for_owner(&self, owner_id: &str) -> Result<Vec<QueuedOperation>> {
        self.store.pending_for_owner(owner_id).await
    }

    pub async fn pending_for(&self, owner_id: &str, collection: &str) -> Result<Vec<QueuedOperation>> {
        self.store.pending_scope(owner_id, collection).await
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.queue_len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Flush every pending scope.
    pub async fn flush(&self) -> Result<FlushReport> {
        let pending = self.store.pending_operations().await?;
        self.flush_scopes(scopes_in_order(&pending)).await
    }

    /// Flush every pending scope of one owner.
    pub async fn flush_owner(&self, owner_id: &str) -> Result<FlushReport> {
        let pending = self.store.pending_for_owner(owner_id).await?;
        self.flush_scopes(scopes_in_order(&pending)).await
    }

    async fn flush_scopes(&self, scopes: Vec<QueueScope>) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        for scope in scopes {
            let outcome = self.flush_scope(&scope.owner_id, &scope.collection).await?;
            if outcome.status != ScopeFlushStatus::Empty {
                report.scopes.push(outcome);
            }
        }

        if !report.scopes.is_empty() {
            tracing::info!(
                "Queue flush finished: removed={}, failed={}, dropped={}",
                report.removed(),
                report.failed(),
                report.dropped()
            );
        }
        Ok(report)
    }

    /// Replay one (owner, collection) batch.
    ///
    /// Holds the scope's in-flight lock for the whole attempt; a concurrent
    /// call for the same scope waits and then sees only what is still
    /// pending.
    pub async fn flush_scope(&self, owner_id: &str, collection: &str) -> Result<ScopeFlushOutcome> {
        let scope = QueueScope::new(owner_id, collection);
        let _in_flight = self.locks.acquire(&scope).await;

        let batch = self.store.pending_scope(owner_id, collection).await?;
        if batch.is_empty() {
            return Ok(ScopeFlushOutcome::empty(scope));
        }

        let ids: Vec<OperationId> = batch.iter().map(|operation| operation.id).collect();
        let highest_retry = batch
            .iter()
            .map(|operation| operation.retry_count)
            .max()
            .unwrap_or(0);
        let request = CollectionSyncRequest::new(collection, owner_id).with_operations(batch.clone());

        match self.gate.sync_collection(&request).await {
            Ok(outcome) => {
                self.store.remove_operations(&ids).await?;
                tracing::debug!(
                    "Confirmed {} operation(s) for {owner_id}/{collection}",
                    ids.len()
                );
                Ok(ScopeFlushOutcome {
                    scope,
                    status: ScopeFlushStatus::Confirmed,
                    replayed: ids,
                    dropped: Vec::new(),
                    retry_count: 0,
                    error: None,
                    outcome: Some(outcome),
                })
            }
            Err(error) => {
                tracing::warn!(
                    "Sync of {owner_id}/{collection} failed ({} pending): {error}",
                    ids.len()
                );
                self.store.increment_retries(&ids).await?;
                let dropped = self.drop_exhausted(&batch).await?;
                Ok(ScopeFlushOutcome {
                    scope,
                    status: ScopeFlushStatus::Failed,
                    replayed: ids,
                    dropped,
                    retry_count: highest_retry.saturating_add(1),
                    error: Some(error.to_string()),
                    outcome: None,
                })
            }
        }
    }

    /// Remove operations whose retry count reached the limit.
    async fn drop_exhausted(&self, batch: &[QueuedOperation]) -> Result<Vec<OperationId>> {
        let Some(limit) = self.max_retry_count else {
            return Ok(Vec::new());
        };

        let exhausted: Vec<OperationId> = batch
            .iter()
            .filter(|operation| operation.retry_count.saturating_add(1) >= limit)
            .map(|operation| operation.id)
            .collect();
        if exhausted.is_empty() {
            return Ok(exhausted);
        }

        self.store.remove_operations(&exhausted).await?;
        tracing::warn!(
            "Dropped {} operation(s) after {limit} failed attempts: {:?}",
            exhausted.len(),
            exhausted
        );
        Ok(exhausted)
    }
}

/// Distinct scopes in order of their oldest pending operation.
fn scopes_in_order(pending: &[QueuedOperation]) -> Vec<QueueScope> {
    let mut seen = HashSet::new();
    pending
        .iter()
        .filter(|operation| seen.insert(operation.scope()))
        .map(|operation| QueueScope::new(&operation.owner_id, &operation.collection))
        .collect()
}
