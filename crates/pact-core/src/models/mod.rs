//! Data models for Pact sync

mod backup;
mod conflict;
mod health;
mod metrics;
mod operation;
mod permissions;
mod record;
mod relationship;

pub use backup::{BackupId, BackupInfo, BackupSnapshot, RestoreReport};
pub use conflict::{
    ConflictContext, ConflictId, ConflictPriority, ConflictResolution, ConflictType,
    ConflictVersions, DataConflict, EntityKind, GlobalResolutionStrategy, NewConflict,
    ResolutionResult, ResolutionStrategy, ResolvedConflict,
};
pub use health::{HealthIssue, HealthStatus, IssueSeverity, SyncHealthReport};
pub use metrics::SyncMetrics;
pub use operation::{NewOperation, OperationId, OperationKind, QueuedOperation};
pub use permissions::{PrivacyLevel, SyncCollection, SyncFrequency, SyncPermissions};
pub use record::LocalRecord;
pub use relationship::{
    ConnectionStrength, PendingChange, RelationshipSyncResult, RelationshipSyncStatus,
    SyncQuality,
};
