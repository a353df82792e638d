//! Local dataset record

use serde::{Deserialize, Serialize};

/// One record of the local dataset, stored as its JSON shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub collection: String,
    pub record_id: String,
    pub owner_id: String,
    pub data: serde_json::Value,
    /// Last local write (Unix ms)
    pub updated_at: i64,
    /// Soft delete flag for sync
    pub is_deleted: bool,
}
