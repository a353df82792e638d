use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pact_core::config::{parse_engine_config, HttpGateConfig, SyncEngineConfig};
use pact_core::error::SyncTransportError;
use pact_core::models::{ConflictType, GlobalResolutionStrategy, ResolutionStrategy};
use pact_core::services::LocalStore;
use pact_core::sync::{
    CollectionSyncOutcome, CollectionSyncRequest, HttpSyncGate, RemoteSyncGate,
};
use pact_core::util::normalize_text_option;
use pact_core::SyncSession;
use serde::Serialize;

use crate::error::CliError;

/// Everything a command needs to open a session.
pub struct SessionArgs {
    pub db_path: PathBuf,
    pub user_id: Option<String>,
    pub remote: Option<HttpGateConfig>,
    pub engine: SyncEngineConfig,
}

impl SessionArgs {
    /// Combine flags with `PACT_*` environment variables; flags win.
    pub fn resolve(
        db_path: Option<PathBuf>,
        user: Option<String>,
        remote_url: Option<String>,
        config_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let db_path = db_path
            .or_else(|| env::var_os("PACT_DB_PATH").map(PathBuf::from))
            .unwrap_or_else(default_db_path);
        let user_id = normalize_text_option(user.or_else(|| env::var("PACT_USER_ID").ok()));
        let engine = match config_path.or_else(|| env::var_os("PACT_CONFIG").map(PathBuf::from)) {
            Some(path) => load_engine_config(&path)?,
            None => SyncEngineConfig::default(),
        };
        let remote = resolve_remote(
            remote_url.or_else(|| env::var("PACT_REMOTE_URL").ok()),
            env::var("PACT_REMOTE_TOKEN").ok(),
        )?
        .map(|remote| remote.with_request_timeout_ms(engine.request_timeout_ms));

        Ok(Self {
            db_path,
            user_id,
            remote,
            engine,
        })
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pact")
        .join("pact.db")
}

pub fn resolve_remote(
    url: Option<String>,
    token: Option<String>,
) -> Result<Option<HttpGateConfig>, CliError> {
    normalize_text_option(url)
        .map(|url| HttpGateConfig::new(url, token).map_err(CliError::Config))
        .transpose()
}

pub fn load_engine_config(path: &Path) -> Result<SyncEngineConfig, CliError> {
    let payload = std::fs::read_to_string(path)?;
    parse_engine_config(&payload)
        .map_err(|error| CliError::Config(format!("{}: {error}", path.display())))
}

/// Gate used when no remote is configured; every sync fails.
struct OfflineGate;

#[async_trait]
impl RemoteSyncGate for OfflineGate {
    async fn sync_collection(
        &self,
        _request: &CollectionSyncRequest,
    ) -> Result<CollectionSyncOutcome, SyncTransportError> {
        Err(SyncTransportError::Unavailable(
            "remote sync is not configured".to_string(),
        ))
    }
}

/// Open a session for local-only commands.
pub async fn open_session(args: &SessionArgs) -> Result<SyncSession, CliError> {
    build_session(args, false).await
}

/// Open a session for commands that talk to the remote.
pub async fn open_remote_session(args: &SessionArgs) -> Result<SyncSession, CliError> {
    build_session(args, true).await
}

async fn build_session(args: &SessionArgs, require_remote: bool) -> Result<SyncSession, CliError> {
    let user_id = args.user_id.clone().ok_or(CliError::MissingUser)?;
    let gate: Arc<dyn RemoteSyncGate> = match &args.remote {
        Some(config) => Arc::new(HttpSyncGate::new(config).map_err(pact_core::Error::from)?),
        None if require_remote => return Err(CliError::RemoteNotConfigured),
        None => Arc::new(OfflineGate),
    };

    let store = LocalStore::open_path(&args.db_path).await?;
    Ok(SyncSession::new(store, gate, user_id, args.engine.clone())?)
}

/// Parse `TYPE=STRATEGY` overrides on top of a default strategy.
pub fn parse_global_strategy(
    default: &str,
    overrides: &[String],
) -> Result<GlobalResolutionStrategy, CliError> {
    let mut strategy = GlobalResolutionStrategy::new(default.parse::<ResolutionStrategy>()?);
    for entry in overrides {
        let (conflict_type, chosen) = entry.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("expected TYPE=STRATEGY, got '{entry}'"))
        })?;
        strategy = strategy.with_type(
            conflict_type.parse::<ConflictType>()?,
            chosen.parse::<ResolutionStrategy>()?,
        );
    }
    Ok(strategy)
}

pub fn parse_json_data(raw: &str) -> Result<serde_json::Value, CliError> {
    serde_json::from_str(raw)
        .map_err(|error| CliError::InvalidArgument(format!("--data is not valid JSON: {error}")))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms).single().map_or_else(
        || timestamp_ms.to_string(),
        |value| value.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn format_optional_time(timestamp_ms: Option<i64>, now_ms: i64) -> String {
    timestamp_ms.map_or_else(
        || "never".to_string(),
        |value| format_relative_time(value, now_ms),
    )
}
