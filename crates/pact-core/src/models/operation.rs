//! Queued mutation model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Monotonic queue identifier assigned by the local store at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub i64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown operation kind '{other}'"))),
        }
    }
}

/// A mutation waiting to be enqueued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub kind: OperationKind,
    /// Target collection name (e.g. `tasks`)
    pub collection: String,
    /// User that owns the mutated record
    pub owner_id: String,
    /// Post-mutation shape of the record
    pub payload: serde_json::Value,
}

impl NewOperation {
    pub fn new(
        kind: OperationKind,
        collection: impl Into<String>,
        owner_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            collection: collection.into(),
            owner_id: owner_id.into(),
            payload,
        }
    }
}

/// One pending local mutation in the durable queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub collection: String,
    pub owner_id: String,
    pub payload: serde_json::Value,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Number of failed replay attempts
    pub retry_count: u32,
}

impl QueuedOperation {
    /// Replay key: operations sharing it are replayed strictly in order.
    pub fn scope(&self) -> (&str, &str) {
        (&self.owner_id, &self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_parses_case_insensitively() {
        assert_eq!("Create".parse::<OperationKind>().unwrap(), OperationKind::Create);
        assert_eq!(" delete ".parse::<OperationKind>().unwrap(), OperationKind::Delete);
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn operation_kind_serializes_lowercase() {
        let json = serde_json::to_string(&OperationKind::Update).unwrap();
        assert_eq!(json, "\"update\"");
    }
}
