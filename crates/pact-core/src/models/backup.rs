//! Backup snapshot model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConflictId, LocalRecord};

/// A unique identifier for a backup, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupId(Uuid);

impl BackupId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BackupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Metadata returned when a backup is created or listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub id: BackupId,
    pub owner_id: String,
    /// Serialized snapshot size in bytes
    pub size_bytes: u64,
    pub collections: Vec<String>,
    pub record_count: usize,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Full snapshot content, keyed by collection name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub collections: BTreeMap<String, Vec<LocalRecord>>,
}

impl BackupSnapshot {
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Outcome of restoring a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub backup_id: BackupId,
    /// Records absent locally and written back from the snapshot
    pub restored_records: usize,
    /// Records identical to the snapshot
    pub unchanged_records: usize,
    /// Differing records, left untouched and raised as conflicts
    pub conflicts_created: Vec<ConflictId>,
}
