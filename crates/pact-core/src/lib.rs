//! pact-core - Core library for Pact
//!
//! This crate contains the offline-first sync core shared by every Pact
//! interface: the durable mutation queue, the conflict model and resolver,
//! relationship-scoped sync orchestration, health reporting, and
//! backup/restore.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{
    ConflictId, ConflictResolution, ConflictType, DataConflict, OperationId, OperationKind,
    QueuedOperation, RelationshipSyncStatus, ResolutionStrategy, SyncMetrics, SyncPermissions,
};
pub use services::SyncSession;
