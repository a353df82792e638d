//! Observable sync cycle state.

use serde::{Deserialize, Serialize};

/// Phase of the current full sync cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Completed,
    Error,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Snapshot published on the progress channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub state: SyncState,
    /// 0.0 to 1.0
    pub progress: f64,
    pub message: Option<String>,
}

impl SyncProgress {
    pub fn syncing(progress: f64, message: impl Into<String>) -> Self {
        Self {
            state: SyncState::Syncing,
            progress: progress.clamp(0.0, 1.0),
            message: Some(message.into()),
        }
    }

    pub const fn completed() -> Self {
        Self {
            state: SyncState::Completed,
            progress: 1.0,
            message: None,
        }
    }

    pub fn error(progress: f64, message: impl Into<String>) -> Self {
        Self {
            state: SyncState::Error,
            progress: progress.clamp(0.0, 1.0),
            message: Some(message.into()),
        }
    }
}
