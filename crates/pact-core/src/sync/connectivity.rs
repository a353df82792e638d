//! Connectivity signal and the flush it triggers.

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::backoff::backoff_delay;
use super::conflicts::ConflictManager;
use super::queue::MutationQueue;

/// Online/offline observable plus a "background sync requested" signal.
///
/// The platform feeds it; nothing here polls the network.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    online: Arc<watch::Sender<bool>>,
    background: Arc<Notify>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (online, _) = watch::channel(initially_online);
        Self {
            online: Arc::new(online),
            background: Arc::new(Notify::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            tracing::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Platform asked for a background sync.
    pub fn request_background_sync(&self) {
        self.background.notify_one();
    }
}

/// Spawn the task that flushes the queue whenever connectivity returns or a
/// background sync is requested. Divergences reported by the remote are
/// registered as conflicts.
///
/// While online, failed flushes are retried after [`backoff_delay`] of the
/// highest retry count; going offline ends the retry loop until the next
/// transition.
pub fn spawn_reconnect_flush(
    queue: MutationQueue,
    conflicts: ConflictManager,
    monitor: &ConnectivityMonitor,
) -> JoinHandle<()> {
    let mut online = monitor.subscribe();
    let background = Arc::clone(&monitor.background);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !*online.borrow_and_update() {
                        continue;
                    }
                    tracing::debug!("Back online, flushing queue");
                }
                () = background.notified() => {
                    if !*online.borrow() {
                        tracing::debug!("Background sync requested while offline, skipping");
                        continue;
                    }
                    tracing::debug!("Background sync requested, flushing queue");
                }
            }
            flush_until_clean(&queue, &conflicts, &mut online).await;
        }
    })
}

async fn flush_until_clean(
    queue: &MutationQueue,
    conflicts: &ConflictManager,
    online: &mut watch::Receiver<bool>,
) {
    loop {
        let report = match queue.flush().await {
            Ok(report) => report,
            Err(error) => {
                tracing::warn!("Queue flush failed: {error}");
                return;
            }
        };
        if let Err(error) = conflicts
            .register_divergences(None, &report.divergences())
            .await
        {
            tracing::warn!("Could not register divergences: {error}");
        }
        if report.is_clean() {
            return;
        }

        let delay = backoff_delay(report.max_retry_count());
        tracing::debug!("Retrying flush in {}s", delay.as_secs());
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            changed = online.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        if !*online.borrow_and_update() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewOperation, OperationKind};
    use crate::services::LocalStore;
    use crate::sync::testing::ScriptedGate;
    use serde_json::json;
    use std::time::Duration;

    async fn queue_with_one_op() -> (MutationQueue, ConflictManager, Arc<ScriptedGate>) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let gate = Arc::new(ScriptedGate::always_ok());
        let queue = MutationQueue::new(store.clone(), gate.clone());
        queue
            .enqueue(NewOperation::new(OperationKind::Create, "tasks", "u1", json!({})))
            .await
            .unwrap();
        (queue, ConflictManager::new(store, "u1"), gate)
    }

    async fn wait_until_empty(queue: &MutationQueue) -> bool {
        for _ in 0..100 {
            if queue.is_empty().await.unwrap() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn going_online_flushes_queue() {
        let (queue, conflicts, gate) = queue_with_one_op().await;
        let monitor = ConnectivityMonitor::new(false);
        let task = spawn_reconnect_flush(queue.clone(), conflicts, &monitor);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.calls().is_empty());

        monitor.set_online(true);
        assert!(wait_until_empty(&queue).await);
        assert_eq!(gate.calls().len(), 1);
        task.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_request_flushes_only_when_online() {
        let (queue, conflicts, gate) = queue_with_one_op().await;
        let monitor = ConnectivityMonitor::new(false);
        let task = spawn_reconnect_flush(queue.clone(), conflicts, &monitor);

        monitor.request_background_sync();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.calls().is_empty());

        monitor.set_online(true);
        assert!(wait_until_empty(&queue).await);

        queue
            .enqueue(NewOperation::new(OperationKind::Update, "goals", "u1", json!({})))
            .await
            .unwrap();
        monitor.request_background_sync();
        assert!(wait_until_empty(&queue).await);
        assert_eq!(gate.calls().len(), 2);
        task.abort();
    }

    #[test]
    fn set_online_is_idempotent() {
        let monitor = ConnectivityMonitor::new(true);
        let rx = monitor.subscribe();
        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!monitor.is_online());
    }
}
