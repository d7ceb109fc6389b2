//! REST client for the notification service endpoints beside the push channel.
//!
//! Thin HTTP wrapper: build the request, read the body as text, check the
//! status, then parse. Parsing lives in `parse_body` so it is testable
//! without a server.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HubConfig;
use crate::transport;

const USER_ID_HEADER: &str = "X-User-Id";
const ANONYMOUS_USER: &str = "anonymous";
const REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("notification API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification API returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("notification API response parse failed: {0}")]
    Parse(String),
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Body of `POST /send/{sessionId}` and `POST /broadcast`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub message: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<Value>,
}

impl SendNotificationRequest {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: None, payload: None }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub success: bool,
    pub message: String,
}

/// Server-side view of one session's push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConnectionStatus {
    pub session_id: String,
    pub connected: bool,
    pub active_connections: u64,
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct NotificationApi {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl NotificationApi {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &HubConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::with_client(http, &config.base_url))
    }

    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            user_id: ANONYMOUS_USER.to_owned(),
        }
    }

    /// Identify the caller in the `X-User-Id` header (default `anonymous`).
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Push a notification to one session.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad body.
    pub async fn send(
        &self,
        session_id: &str,
        request: &SendNotificationRequest,
    ) -> Result<NotificationResponse, ApiError> {
        let url = format!("{}/send/{session_id}", self.base_url);
        self.execute(self.http.post(url).json(request)).await
    }

    /// Push a notification to every connected session.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad body.
    pub async fn broadcast(&self, request: &SendNotificationRequest) -> Result<NotificationResponse, ApiError> {
        let url = format!("{}/broadcast", self.base_url);
        self.execute(self.http.post(url).json(request)).await
    }

    /// Ask the server whether `session_id` has a live push channel.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad body.
    pub async fn connection_status(&self, session_id: &str) -> Result<RemoteConnectionStatus, ApiError> {
        let url = format!("{}/status/{session_id}", self.base_url);
        self.execute(self.http.get(url)).await
    }

    /// URL of the push channel for `session_id`.
    #[must_use]
    pub fn subscribe_url(&self, session_id: &str, timeout_ms: Option<u64>) -> String {
        transport::subscribe_url(&self.base_url, session_id, timeout_ms)
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = request.header(USER_ID_HEADER, &self.user_id).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "api: notification request rejected");
            return Err(ApiError::Status { status: status.as_u16(), body: text });
        }
        parse_body(&text)
    }
}

fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Parse(e.to_string()))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
