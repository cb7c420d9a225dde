//! Client for the remote time tracking service.
//!
//! The daemon only needs two operations, expressed by the [`SessionApi`] trait:
//! starting a session and looking up the current session's timestamps. The
//! production implementation is [`HackHourClient`]; the trait keeps the router
//! testable without a network.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::models::session::{ApiEnvelope, SessionTimes, TimestampError};

// ============================================================================
// SessionApi trait
// ============================================================================

/// Remote operations the daemon calls into.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Begin a session. Returns the raw status line and body whatever the status is;
    /// only transport failures are errors.
    async fn start_session(
        &self,
        work: &str,
        slack_id: &str,
        api_key: &str,
    ) -> Result<RawResponse, ApiError>;

    /// Fetch the current (or most recent) session's start and end.
    async fn session_times(&self, slack_id: &str, api_key: &str)
        -> Result<SessionTimes, ApiError>;
}

/// Status line and body exactly as the service returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: String,
    pub body: String,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to perform API request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("received status {status}: {body}")]
    Status { status: String, body: String },

    #[error("failed to parse response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("API response not OK: {0}")]
    NotOk(String),

    #[error("API response has no session data")]
    MissingData,

    #[error("{0}")]
    Timestamp(#[from] TimestampError),
}

// ============================================================================
// HackHourClient
// ============================================================================

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    work: &'a str,
}

#[derive(Debug, Clone)]
pub struct HackHourClient {
    client: Client,
    base_url: String,
}

impl HackHourClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::with_base_url(config.base_url.clone(), config.timeout_seconds)
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(base_url: String, timeout_seconds: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(
        &self,
        method: Method,
        endpoint: &str,
        slack_id: &str,
        api_key: &str,
    ) -> RequestBuilder {
        let url = format!("{}/api/{}/{}", self.base_url, endpoint, slack_id);
        self.client.request(method, url).bearer_auth(api_key)
    }

    async fn send(builder: RequestBuilder) -> Result<RawResponse, ApiError> {
        let response = builder.send().await?;
        let status = response.status().to_string();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }

    /// GET `/api/{endpoint}/{slack_id}` (`session`, `stats`, `goals`, `history`).
    pub async fn get_resource(
        &self,
        endpoint: &str,
        slack_id: &str,
        api_key: &str,
    ) -> Result<RawResponse, ApiError> {
        Self::send(self.request(Method::GET, endpoint, slack_id, api_key)).await
    }

    /// POST `/api/{endpoint}/{slack_id}` with no body (`pause`, `cancel`).
    pub async fn post_action(
        &self,
        endpoint: &str,
        slack_id: &str,
        api_key: &str,
    ) -> Result<RawResponse, ApiError> {
        Self::send(self.request(Method::POST, endpoint, slack_id, api_key)).await
    }
}

#[async_trait]
impl SessionApi for HackHourClient {
    async fn start_session(
        &self,
        work: &str,
        slack_id: &str,
        api_key: &str,
    ) -> Result<RawResponse, ApiError> {
        let builder = self
            .request(Method::POST, "start", slack_id, api_key)
            .json(&StartRequest { work });
        let raw = Self::send(builder).await?;
        tracing::debug!(slack_id = %slack_id, status = %raw.status, "Start session request completed");
        Ok(raw)
    }

    async fn session_times(
        &self,
        slack_id: &str,
        api_key: &str,
    ) -> Result<SessionTimes, ApiError> {
        let raw = self.get_resource("session", slack_id, api_key).await?;
        session_times_from_body(&raw.body).map_err(|e| match e {
            // A non-JSON body on an error status is more useful as the status itself
            ApiError::InvalidResponse(_) if !raw.status.starts_with('2') => ApiError::Status {
                status: raw.status.clone(),
                body: raw.body.clone(),
            },
            other => other,
        })
    }
}

/// Extract session timestamps from a service response body.
pub fn session_times_from_body(body: &str) -> Result<SessionTimes, ApiError> {
    let envelope = ApiEnvelope::parse(body)?;
    if !envelope.ok {
        return Err(ApiError::NotOk(
            envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    let data = envelope.data.ok_or(ApiError::MissingData)?;
    Ok(data.times()?)
}

// ============================================================================
// TESTS
// ============================================================================
