use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] pact_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No user selected. Pass --user or set PACT_USER_ID.")]
    MissingUser,
    #[error("Remote sync is not configured. Pass --remote-url or set PACT_REMOTE_URL.")]
    RemoteNotConfigured,
}
