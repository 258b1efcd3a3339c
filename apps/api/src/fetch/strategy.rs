use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::fetch::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; Newsletter Bot)";
const ACCEPT: &str = "application/rss+xml, application/xml, text/xml, application/json";

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// One way of retrieving a remote payload. Implementations are
/// interchangeable inside a `FetchStrategyChain`.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short label used in logs and failure reports.
    fn name(&self) -> &str;

    /// Returns the raw payload for `target`. A successful return may still be
    /// empty; the chain decides what counts as usable.
    async fn fetch(&self, target: &str) -> Result<String, FetchError>;
}

// ────────────────────────────────────────────────────────────────────────────
// DirectFetch
// ────────────────────────────────────────────────────────────────────────────

/// GETs the target URL itself.
pub struct DirectFetch {
    client: Client,
}

impl DirectFetch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchStrategy for DirectFetch {
    fn name(&self) -> &str {
        "direct"
    }

    async fn fetch(&self, target: &str) -> Result<String, FetchError> {
        get_text(&self.client, target).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RelayFetch
// ────────────────────────────────────────────────────────────────────────────

/// How a relay wraps the upstream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnvelope {
    /// Body is the payload verbatim.
    Raw,
    /// Body is a JSON object; the payload is the named string field. A
    /// `"success": false` member marks the relay's own upstream call as failed.
    JsonField(String),
}

/// GETs the payload through an intermediary.
///
/// A query relay receives the target as `?url=`; a server relay is bound to
/// one upstream and is called without it.
pub struct RelayFetch {
    client: Client,
    name: String,
    endpoint: String,
    forwards_target: bool,
    envelope: RelayEnvelope,
}

impl RelayFetch {
    /// Public relay taking the target as a query parameter and answering
    /// `{"contents": "..."}`.
    pub fn query_relay(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            name: "relay".to_string(),
            endpoint: endpoint.into(),
            forwards_target: true,
            envelope: RelayEnvelope::JsonField("contents".to_string()),
        }
    }

    /// Server-side proxy answering `{"success": true, "xmlContent": "..."}`.
    pub fn server_relay(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            name: "server-relay".to_string(),
            endpoint: endpoint.into(),
            forwards_target: false,
            envelope: RelayEnvelope::JsonField("xmlContent".to_string()),
        }
    }

    pub fn with_envelope(mut self, envelope: RelayEnvelope) -> Self {
        self.envelope = envelope;
        self
    }

    fn request_url(&self, target: &str) -> Result<String, FetchError> {
        if !self.forwards_target {
            return Ok(self.endpoint.clone());
        }
        Url::parse_with_params(&self.endpoint, &[("url", target)])
            .map(String::from)
            .map_err(|e| FetchError::Relay(format!("invalid relay endpoint: {e}")))
    }
}

#[async_trait]
impl FetchStrategy for RelayFetch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, target: &str) -> Result<String, FetchError> {
        let url = self.request_url(target)?;
        let body = get_text(&self.client, &url).await?;
        unwrap_envelope(&self.envelope, body)
    }
}

/// Extracts the payload from a relay response body.
pub fn unwrap_envelope(envelope: &RelayEnvelope, body: String) -> Result<String, FetchError> {
    let field = match envelope {
        RelayEnvelope::Raw => return Ok(body),
        RelayEnvelope::JsonField(field) => field,
    };

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| FetchError::Relay(format!("response is not JSON: {e}")))?;

    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("relay reported failure");
        return Err(FetchError::Relay(reason.to_string()));
    }

    match value.get(field) {
        Some(Value::String(payload)) => Ok(payload.clone()),
        Some(Value::Null) | None => Err(FetchError::EmptyPayload),
        Some(_) => Err(FetchError::Relay(format!("field '{field}' is not a string"))),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared HTTP
// ────────────────────────────────────────────────────────────────────────────

async fn get_text(client: &Client, url: &str) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", ACCEPT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    debug!(url, bytes = body.len(), "upstream responded");
    Ok(body)
}
