//! Recurring background sync while real-time mode is on.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::relationship::RelationshipOrchestrator;
use crate::error::Result;
use crate::models::{PrivacyLevel, SyncFrequency, SyncPermissions};
use crate::services::LocalStore;

/// Owns at most one recurring sync task for the session user.
pub struct RealtimeSync {
    store: LocalStore,
    orchestrator: RelationshipOrchestrator,
    user_id: String,
    tick_override: Option<Duration>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeSync {
    pub fn new(
        store: LocalStore,
        orchestrator: RelationshipOrchestrator,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            user_id: user_id.into(),
            tick_override: None,
            task: Mutex::new(None),
        }
    }

    #[cfg(test)]
    const fn with_tick(mut self, tick: Duration) -> Self {
        self.tick_override = Some(tick);
        self
    }

    /// Tear down the current task and start a new one if the stored
    /// permissions ask for it. Returns whether a task is now running.
    pub async fn reconfigure(&self) -> Result<bool> {
        let permissions = self.store.load_permissions(&self.user_id).await?;
        self.stop();

        if !wants_realtime(&permissions) {
            tracing::debug!("Real-time sync disabled for {}", self.user_id);
            return Ok(false);
        }

        let frequency = permissions.frequency;
        let period = self.tick_override.unwrap_or_else(|| frequency.interval());
        let handle = tokio::spawn(run_ticks(
            self.store.clone(),
            self.orchestrator.clone(),
            self.user_id.clone(),
            frequency,
            period,
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::info!(
            "Real-time sync for {} every {}s",
            self.user_id,
            period.as_secs_f64()
        );
        Ok(true)
    }

    /// Stop the recurring task; no further ticks fire.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RealtimeSync {
    fn drop(&mut self) {
        self.stop();
    }
}

fn wants_realtime(permissions: &SyncPermissions) -> bool {
    permissions.realtime_enabled && permissions.privacy_level != PrivacyLevel::Private
}

async fn run_ticks(
    store: LocalStore,
    orchestrator: RelationshipOrchestrator,
    user_id: String,
    frequency: SyncFrequency,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        // Permissions may have changed since the task started.
        match store.load_permissions(&user_id).await {
            Ok(permissions) if wants_realtime(&permissions) && permissions.frequency == frequency => {}
            Ok(_) => {
                tracing::info!("Real-time sync for {user_id} revoked or rescheduled, stopping");
                break;
            }
            Err(error) => {
                tracing::warn!("Could not read sync permissions: {error}");
                continue;
            }
        }

        if let Err(error) = orchestrator.flush_pending().await {
            tracing::warn!("Real-time queue flush failed: {error}");
        }
        match orchestrator.sync_all_relationships().await {
            Ok(results) => {
                let failed = results.iter().filter(|result| !result.success).count();
                tracing::debug!(
                    "Real-time tick synced {} relationship(s), {failed} failed",
                    results.len()
                );
            }
            Err(error) => tracing::warn!("Real-time relationship sync failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::conflicts::ConflictManager;
    use crate::sync::queue::MutationQueue;
    use crate::sync::testing::ScriptedGate;
    use std::sync::Arc;

    async fn scheduler() -> (RealtimeSync, LocalStore, Arc<ScriptedGate>) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let gate = Arc::new(ScriptedGate::always_ok());
        let queue = MutationQueue::new(store.clone(), gate.clone());
        let conflicts = ConflictManager::new(store.clone(), "u1");
        let orchestrator =
            RelationshipOrchestrator::new(store.clone(), gate.clone(), queue, conflicts, "u1");
        orchestrator.add_relationship("rel-1", "kh", "Keyholder").await.unwrap();
        let realtime = RealtimeSync::new(store.clone(), orchestrator, "u1")
            .with_tick(Duration::from_millis(20));
        (realtime, store, gate)
    }

    async fn enable_realtime(store: &LocalStore) {
        let mut permissions = store.load_permissions("u1").await.unwrap();
        permissions.realtime_enabled = true;
        store.save_permissions(&permissions).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_by_default() {
        let (realtime, _store, _gate) = scheduler().await;
        assert!(!realtime.reconfigure().await.unwrap());
        assert!(!realtime.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ticks_sync_relationships_until_revoked() {
        let (realtime, store, gate) = scheduler().await;
        enable_realtime(&store).await;

        assert!(realtime.reconfigure().await.unwrap());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!gate.calls().is_empty());

        let mut permissions = store.load_permissions("u1").await.unwrap();
        permissions.realtime_enabled = false;
        store.save_permissions(&permissions).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!realtime.is_running());
        let calls = gate.calls().len();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(gate.calls().len(), calls);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_tears_down_the_task() {
        let (realtime, store, _gate) = scheduler().await;
        enable_realtime(&store).await;

        realtime.reconfigure().await.unwrap();
        assert!(realtime.is_running());

        realtime.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!realtime.is_running());
    }
}
