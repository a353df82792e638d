//! Remote sync gate contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncTransportError;
use crate::models::{ConflictType, EntityKind, QueuedOperation};

/// One "sync this collection for this owner" call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSyncRequest {
    pub collection: String,
    pub owner_id: String,
    /// Set for relationship-scoped syncs
    pub relationship_id: Option<String>,
    /// Pending local operations for this (owner, collection), in replay order
    pub operations: Vec<QueuedOperation>,
}

impl CollectionSyncRequest {
    pub fn new(collection: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            owner_id: owner_id.into(),
            relationship_id: None,
            operations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship_id: impl Into<String>) -> Self {
        self.relationship_id = Some(relationship_id.into());
        self
    }

    #[must_use]
    pub fn with_operations(mut self, operations: Vec<QueuedOperation>) -> Self {
        self.operations = operations;
        self
    }
}

/// A record the remote side holds in a different shape than we do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDivergence {
    pub conflict_type: ConflictType,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub local: serde_json::Value,
    pub remote: serde_json::Value,
    /// Keyholder's version, when the partner also edited the record
    #[serde(default)]
    pub keyholder: Option<serde_json::Value>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

/// What a successful collection sync reports back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSyncOutcome {
    #[serde(default)]
    pub bytes_transferred: u64,
    #[serde(default)]
    pub divergences: Vec<RemoteDivergence>,
}

/// Thin interface to the remote store.
///
/// Any `Err` is a uniform "sync failed" signal; callers never inspect it
/// beyond logging.
#[async_trait]
pub trait RemoteSyncGate: Send + Sync {
    async fn sync_collection(
        &self,
        request: &CollectionSyncRequest,
    ) -> Result<CollectionSyncOutcome, SyncTransportError>;
}
