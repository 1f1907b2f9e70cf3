use std::error::Error as _;
use std::fmt;
use std::time::{Duration, Instant};

use aichain_shared::account::{RemoteHeartbeat, UserInfo};
use aichain_shared::heartbeat::HeartbeatRequest;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::auth::{API_KEY_HEADER, ApiKey};
use crate::config::HeartbeatSettings;

/// Response body, decoded as JSON when it parses.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(text),
        }
    }
}

/// JSON bodies print as compact JSON, so `{"ok": true}` on the wire shows up
/// as `{"ok":true}` in status lines. Text bodies print verbatim.
impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Json(value) => write!(f, "{}", value),
            ResponseBody::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: ResponseBody,
    pub elapsed: Duration,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("{0}")]
    Failure(String),
}

impl TransportError {
    fn from_reqwest(e: reqwest::Error, elapsed: Duration) -> Self {
        if e.is_timeout() {
            TransportError::Timeout { elapsed }
        } else {
            TransportError::Failure(describe_error(&e))
        }
    }
}

/// `Display` of the error followed by its source chain.
fn describe_error(e: &reqwest::Error) -> String {
    let mut description = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}

fn get_client(timeout: Duration, trust_invalid_server_cert: bool) -> Result<Client> {
    let builder = Client::builder().timeout(timeout);
    // only for self hosted test endpoints
    let builder = if trust_invalid_server_cert {
        builder.danger_accept_invalid_certs(true)
    } else {
        builder
    };
    builder.build().context("Failed to build HTTP client")
}

/// One POST per call, no retries. Cadence is owned by the heartbeat loop.
#[derive(Clone)]
pub struct HeartbeatClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HeartbeatClient {
    pub fn new(settings: &HeartbeatSettings) -> Result<Self> {
        Ok(Self {
            client: get_client(settings.timeout, settings.trust_invalid_server_cert)?,
            endpoint: settings.endpoint.clone(),
            timeout: settings.timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn post_heartbeat(
        &self,
        api_key: &ApiKey,
        req: &HeartbeatRequest,
    ) -> Result<RawResponse, TransportError> {
        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, api_key.expose())
            .json(req)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, start.elapsed()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, start.elapsed()))?;
        let elapsed = start.elapsed();

        debug!(status, ?elapsed, "Heartbeat response received");
        Ok(RawResponse {
            status,
            body: ResponseBody::from_text(text),
            elapsed,
        })
    }
}

pub async fn fetch_user_info(settings: &HeartbeatSettings, api_key: &ApiKey) -> Result<UserInfo> {
    let client = get_client(settings.timeout, settings.trust_invalid_server_cert)?;
    let url = format!("{}/me", settings.account_api_url);

    let info = client
        .get(&url)
        .header(API_KEY_HEADER, api_key.expose())
        .send()
        .await
        .context("Failed to request user info")?
        .error_for_status()?
        .json::<UserInfo>()
        .await
        .context("Failed to decode user info")?;
    Ok(info)
}

pub async fn fetch_remote_heartbeat(
    settings: &HeartbeatSettings,
    api_key: &ApiKey,
) -> Result<RemoteHeartbeat> {
    let client = get_client(settings.timeout, settings.trust_invalid_server_cert)?;
    let url = format!("{}/heartbeat", settings.account_api_url);

    let start = Instant::now();
    let resp = client
        .get(&url)
        .header(API_KEY_HEADER, api_key.expose())
        .send()
        .await
        .context("Failed to request heartbeat status")?;
    let latency_ms = start.elapsed().as_millis() as u64;

    let fields = resp
        .error_for_status()?
        .json::<serde_json::Map<String, Value>>()
        .await
        .context("Failed to decode heartbeat status")?;

    Ok(RemoteHeartbeat { latency_ms, fields })
}
