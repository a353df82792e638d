//! Offline-first sync engine: queue replay, conflicts and relationship sync.

mod backoff;
mod backup;
mod conflicts;
mod connectivity;
mod gate;
mod health;
mod http_gate;
mod locks;
mod queue;
mod relationship;
mod resolver;
mod scheduler;
mod state;
mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::backoff_delay;
pub use backup::BackupService;
pub use conflicts::ConflictManager;
pub use connectivity::{spawn_reconnect_flush, ConnectivityMonitor};
pub use gate::{CollectionSyncOutcome, CollectionSyncRequest, RemoteDivergence, RemoteSyncGate};
pub use health::assess_health;
pub use http_gate::HttpSyncGate;
pub use queue::{FlushReport, MutationQueue, QueueScope, ScopeFlushOutcome, ScopeFlushStatus};
pub use relationship::{FullSyncReport, RelationshipOrchestrator};
pub use resolver::{latest_timestamp, merge_intelligent, resolve_versions, version_timestamp};
pub use scheduler::RealtimeSync;
pub use state::{SyncProgress, SyncState};
pub use stats::{collect_statistics, SyncStatistics};
