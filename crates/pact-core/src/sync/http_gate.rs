//! HTTP implementation of the remote sync gate.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::gate::{CollectionSyncOutcome, CollectionSyncRequest, RemoteSyncGate};
use crate::config::HttpGateConfig;
use crate::error::SyncTransportError;
use crate::models::QueuedOperation;
use crate::util::compact_text;

/// POSTs each collection sync to `{base_url}/v1/sync/{collection}`.
#[derive(Clone)]
pub struct HttpSyncGate {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncGate {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncGate")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SyncRequestBody<'a> {
    owner_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    relationship_id: Option<&'a str>,
    operations: &'a [QueuedOperation],
}

#[derive(Deserialize)]
struct SyncErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpSyncGate {
    pub fn new(config: &HttpGateConfig) -> Result<Self, SyncTransportError> {
        Ok(Self {
            base_url: config.base_url.clone(),
            auth_token: config.auth_token.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(config.request_timeout_ms))
                .build()?,
        })
    }

    fn endpoint(&self, collection: &str) -> String {
        format!("{}/v1/sync/{collection}", self.base_url)
    }
}

#[async_trait]
impl RemoteSyncGate for HttpSyncGate {
    async fn sync_collection(
        &self,
        request: &CollectionSyncRequest,
    ) -> Result<CollectionSyncOutcome, SyncTransportError> {
        let body = SyncRequestBody {
            owner_id: &request.owner_id,
            relationship_id: request.relationship_id.as_deref(),
            operations: &request.operations,
        };

        let mut builder = self
            .client
            .post(self.endpoint(&request.collection))
            .header("Accept", "application/json")
            .json(&body);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SyncTransportError::Rejected {
                collection: request.collection.clone(),
                message: parse_api_error(status, &text),
            });
        }

        if text.trim().is_empty() {
            return Ok(CollectionSyncOutcome {
                bytes_transferred: 0,
                divergences: Vec::new(),
            });
        }
        let mut outcome: CollectionSyncOutcome = serde_json::from_str(&text).map_err(|error| {
            SyncTransportError::Unavailable(format!("invalid sync response: {error}"))
        })?;
        if outcome.bytes_transferred == 0 {
            outcome.bytes_transferred = u64::try_from(text.len()).unwrap_or(u64::MAX);
        }
        Ok(outcome)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SyncErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_prefers_message_field() {
        let message = parse_api_error(StatusCode::CONFLICT, r#"{"message":" stale version "}"#);
        assert_eq!(message, "stale version (409)");
    }

    #[test]
    fn api_error_falls_back_to_body_or_status() {
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "boom (500)"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let config =
            HttpGateConfig::new("https://sync.example.com", Some("secret".into())).unwrap();
        let gate = HttpSyncGate::new(&config).unwrap();
        let debug = format!("{gate:?}");
        assert!(!debug.contains("secret"));
        assert_eq!(gate.endpoint("tasks"), "https://sync.example.com/v1/sync/tasks");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn silent_remote_times_out() {
        // Accepted by the kernel backlog, never answered
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let config = HttpGateConfig::new(format!("http://{address}"), None)
            .unwrap()
            .with_request_timeout_ms(200);
        let gate = HttpSyncGate::new(&config).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            gate.sync_collection(&CollectionSyncRequest::new("tasks", "u1")),
        )
        .await
        .expect("request timeout did not fire");

        assert!(matches!(result, Err(SyncTransportError::Http(error)) if error.is_timeout()));
        drop(listener);
    }
}
