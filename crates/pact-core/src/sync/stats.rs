//! Aggregate statistics over persisted sync state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ConflictPriority, SyncMetrics};
use crate::services::LocalStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatistics {
    pub user_id: String,
    /// Live local records per collection
    pub records: BTreeMap<String, u64>,
    /// Queued operations per collection
    pub pending_operations: BTreeMap<String, u64>,
    /// Highest priority first
    pub conflicts_by_priority: Vec<(ConflictPriority, u64)>,
    pub relationships: usize,
    pub backups: usize,
    pub metrics: SyncMetrics,
}

impl SyncStatistics {
    pub fn total_records(&self) -> u64 {
        self.records.values().sum()
    }

    pub fn total_pending(&self) -> u64 {
        self.pending_operations.values().sum()
    }

    pub fn total_conflicts(&self) -> u64 {
        self.conflicts_by_priority.iter().map(|(_, count)| count).sum()
    }
}

/// Count what is actually stored for one user.
pub async fn collect_statistics(store: &LocalStore, user_id: &str) -> Result<SyncStatistics> {
    let records = store.record_counts(user_id).await?.into_iter().collect();

    let mut pending_operations = BTreeMap::new();
    for operation in store.pending_for_owner(user_id).await? {
        *pending_operations.entry(operation.collection).or_insert(0) += 1;
    }

    Ok(SyncStatistics {
        user_id: user_id.to_string(),
        records,
        pending_operations,
        conflicts_by_priority: store.conflict_counts(user_id).await?,
        relationships: store.list_relationships(user_id).await?.len(),
        backups: store.list_backups(user_id).await?.len(),
        metrics: store.load_metrics(user_id).await?,
    })
}
