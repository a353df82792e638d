//! Engine and remote gate configuration.
//!
//! `SyncEngineConfig` tunes retry, retention and health thresholds;
//! `HttpGateConfig` points the HTTP sync gate at a backend.

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_MAX_RETRY_COUNT: u32 = 10;
const DEFAULT_BACKUP_RETENTION_DAYS: u32 = 30;
const DEFAULT_LATENCY_BUDGET_MS: u64 = 10_000;
const DEFAULT_CONFLICT_BACKLOG_WARNING: usize = 10;
const DEFAULT_STALE_SYNC_HOURS: u32 = 24;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Tunables for one sync session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct SyncEngineConfig {
    /// Drop a queued operation after this many failed replays; `None` keeps
    /// retrying forever
    pub max_retry_count: Option<u32>,
    pub backup_retention_days: u32,
    /// Latency at which a relationship's latency sub-score reaches zero
    pub latency_budget_ms: u64,
    /// More active conflicts than this raise a health issue
    pub conflict_backlog_warning: usize,
    /// No successful sync for this long raises a health issue
    pub stale_sync_hours: u32,
    /// Upper bound on one remote sync call, connect to last byte
    pub request_timeout_ms: u64,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            max_retry_count: Some(DEFAULT_MAX_RETRY_COUNT),
            backup_retention_days: DEFAULT_BACKUP_RETENTION_DAYS,
            latency_budget_ms: DEFAULT_LATENCY_BUDGET_MS,
            conflict_backlog_warning: DEFAULT_CONFLICT_BACKLOG_WARNING,
            stale_sync_hours: DEFAULT_STALE_SYNC_HOURS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl SyncEngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backup_retention_days == 0 {
            return Err("backup_retention_days must be at least 1".to_string());
        }
        if self.latency_budget_ms == 0 {
            return Err("latency_budget_ms must be greater than 0".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than 0".to_string());
        }
        if self.max_retry_count == Some(0) {
            return Err("max_retry_count must be at least 1 (omit it for no limit)".to_string());
        }
        Ok(())
    }
}

/// Parse and validate an engine config from JSON. Missing fields take their
/// defaults; unknown fields are rejected.
pub fn parse_engine_config(payload: &str) -> Result<SyncEngineConfig, String> {
    let config: SyncEngineConfig = serde_json::from_str(payload)
        .map_err(|error| format!("invalid sync engine config JSON: {error}"))?;
    config.validate()?;
    Ok(config)
}

/// Endpoint of the HTTP remote sync gate.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpGateConfig {
    /// Normalized base URL without a trailing slash
    pub base_url: String,
    pub auth_token: Option<String>,
    /// Per-request timeout; a remote that stops answering fails the sync
    pub request_timeout_ms: u64,
}

impl std::fmt::Debug for HttpGateConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpGateConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl HttpGateConfig {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self, String> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| "remote sync URL must not be empty".to_string())?;
        if !is_http_url(&base_url) {
            return Err("remote sync URL must include http:// or https://".to_string());
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: normalize_text_option(auth_token),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        })
    }

    #[must_use]
    pub const fn with_request_timeout_ms(mut self, request_timeout_ms: u64) -> Self {
        self.request_timeout_ms = request_timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_uses_defaults() {
        let config = parse_engine_config("{}").unwrap();
        assert_eq!(config, SyncEngineConfig::default());
        assert_eq!(config.max_retry_count, Some(10));
    }

    #[test]
    fn null_retry_count_means_unbounded() {
        let config = parse_engine_config(r#"{"max_retry_count": null}"#).unwrap();
        assert_eq!(config.max_retry_count, None);
    }

    #[test]
    fn rejects_unknown_fields_and_invalid_values() {
        assert!(parse_engine_config(r#"{"retries": 3}"#).is_err());
        assert!(parse_engine_config(r#"{"backup_retention_days": 0}"#).is_err());
        assert!(parse_engine_config(r#"{"latency_budget_ms": 0}"#).is_err());
        assert!(parse_engine_config(r#"{"max_retry_count": 0}"#).is_err());
        assert!(parse_engine_config(r#"{"request_timeout_ms": 0}"#).is_err());
    }

    #[test]
    fn gate_config_normalizes_url_and_token() {
        let config =
            HttpGateConfig::new(" https://sync.example.com/ ", Some("  ".to_string())).unwrap();
        assert_eq!(config.base_url, "https://sync.example.com");
        assert_eq!(config.auth_token, None);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);

        assert!(HttpGateConfig::new("sync.example.com", None).is_err());
        assert!(HttpGateConfig::new("", None).is_err());
    }

    #[test]
    fn gate_config_debug_redacts_token() {
        let config =
            HttpGateConfig::new("https://sync.example.com", Some("secret".to_string())).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
