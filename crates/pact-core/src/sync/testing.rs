//! Scripted remote gate for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::gate::{CollectionSyncOutcome, CollectionSyncRequest, RemoteSyncGate};
use crate::error::SyncTransportError;

pub enum Step {
    Ok(CollectionSyncOutcome),
    Fail,
}

/// Records every call and answers from a per-collection script, falling
/// back to `default_ok` once a script runs out.
pub struct ScriptedGate {
    calls: Mutex<Vec<CollectionSyncRequest>>,
    script: Mutex<HashMap<String, VecDeque<Step>>>,
    default_ok: bool,
    delay: Option<Duration>,
}

impl ScriptedGate {
    pub fn always_ok() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(HashMap::new()),
            default_ok: true,
            delay: None,
        }
    }

    pub fn always_fail() -> Self {
        Self {
            default_ok: false,
            ..Self::always_ok()
        }
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, collection: &str, step: Step) {
        self.script
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn fail_times(&self, collection: &str, times: usize) {
        for _ in 0..times {
            self.push(collection, Step::Fail);
        }
    }

    pub fn calls(&self) -> Vec<CollectionSyncRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, collection: &str) -> Vec<CollectionSyncRequest> {
        self.calls()
            .into_iter()
            .filter(|call| call.collection == collection)
            .collect()
    }
}

#[async_trait]
impl RemoteSyncGate for ScriptedGate {
    async fn sync_collection(
        &self,
        request: &CollectionSyncRequest,
    ) -> Result<CollectionSyncOutcome, SyncTransportError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .get_mut(&request.collection)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Step::Ok(outcome)) => Ok(outcome),
            Some(Step::Fail) => Err(SyncTransportError::Unavailable("scripted failure".into())),
            None if self.default_ok => Ok(CollectionSyncOutcome::default()),
            None => Err(SyncTransportError::Unavailable("gate is down".into())),
        }
    }
}
