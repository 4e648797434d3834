//! Control-plane client.
//!
//! [`StatusProbe`] and [`WakeRequester`] are the two seams the lifecycle talks
//! through. [`HttpControlPlane`] implements both over `reqwest`;
//! [`MockControlPlane`](super::MockControlPlane) scripts them in memory.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::status::{RawStatusResponse, StatusDetail};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};

const USER_AGENT: &str = concat!("stagehand/", env!("CARGO_PKG_VERSION"));

/// Single status query against the control plane
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self) -> std::result::Result<StatusDetail, CoordinatorError>;
}

/// Single start request against the control plane. Stateless: callers guard
/// against overlapping wakes themselves.
#[async_trait]
pub trait WakeRequester: Send + Sync {
    async fn request_wake(&self) -> std::result::Result<WakeResult, CoordinatorError>;
}

/// Accepted wake request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeResult {
    pub already_running: bool,
    /// Advisory only
    pub estimated_ready_seconds: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWakeResponse {
    #[serde(default)]
    success: bool,
    state: Option<String>,
    estimated_ready_seconds: Option<f64>,
    message: Option<String>,
    error: Option<String>,
}

impl RawWakeResponse {
    fn into_result(
        self,
        default_estimated_ready_seconds: u64,
    ) -> std::result::Result<WakeResult, CoordinatorError> {
        if !self.success {
            let message = non_blank(self.error)
                .or_else(|| non_blank(self.message))
                .unwrap_or_else(|| "Wake request was rejected".to_string());
            return Err(CoordinatorError::WakeRejected { message });
        }

        let estimated_ready_seconds = self
            .estimated_ready_seconds
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.ceil() as u64)
            .unwrap_or(default_estimated_ready_seconds);

        Ok(WakeResult {
            already_running: self.state.as_deref() == Some("running"),
            estimated_ready_seconds,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Control-plane client over HTTP
pub struct HttpControlPlane {
    http: reqwest::Client,
    status_endpoint: String,
    wake_endpoint: String,
    default_estimated_ready_seconds: u64,
}

impl HttpControlPlane {
    pub fn new(config: &CoordinatorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            status_endpoint: config.status_endpoint.clone(),
            wake_endpoint: config.wake_endpoint.clone(),
            default_estimated_ready_seconds: config.default_estimated_ready_seconds,
        })
    }

    pub fn status_endpoint(&self) -> &str {
        &self.status_endpoint
    }

    pub fn wake_endpoint(&self) -> &str {
        &self.wake_endpoint
    }

    async fn read_body(
        url: &str,
        response: reqwest::Response,
    ) -> std::result::Result<ResponseBody, CoordinatorError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            CoordinatorError::unreachable(format!("Failed to read response from {}: {}", url, e))
        })?;

        debug!(url = url, status = status.as_u16(), len = bytes.len(), "Control plane responded");

        Ok(ResponseBody {
            status,
            bytes: bytes.to_vec(),
        })
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

struct ResponseBody {
    status: StatusCode,
    bytes: Vec<u8>,
}

/// Message for a non-2xx answer: the server's own words if it sent any,
/// otherwise the status text
fn error_message(status: StatusCode, bytes: &[u8]) -> String {
    let body: RawErrorBody = serde_json::from_slice(bytes).unwrap_or_default();

    non_blank(body.message)
        .or_else(|| non_blank(body.error))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        })
}

fn transport_error(url: &str, e: reqwest::Error) -> CoordinatorError {
    warn!(
        url = url,
        error = %e,
        is_connect = e.is_connect(),
        is_timeout = e.is_timeout(),
        "Control plane request failed"
    );
    CoordinatorError::unreachable(format!("Failed to reach control plane: {}", e))
}

#[async_trait]
impl StatusProbe for HttpControlPlane {
    async fn probe(&self) -> std::result::Result<StatusDetail, CoordinatorError> {
        let url = self.status_endpoint.as_str();
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let body = Self::read_body(url, response).await?;
        if !body.status.is_success() {
            let message = error_message(body.status, &body.bytes);
            warn!(url = url, status = body.status.as_u16(), "Status probe rejected: {}", message);
            return Err(CoordinatorError::Unreachable { message });
        }

        let raw: RawStatusResponse = serde_json::from_slice(&body.bytes)
            .map_err(|e| CoordinatorError::invalid_response(e.to_string()))?;

        Ok(StatusDetail::from_raw(raw, Utc::now()))
    }
}

#[async_trait]
impl WakeRequester for HttpControlPlane {
    async fn request_wake(&self) -> std::result::Result<WakeResult, CoordinatorError> {
        let url = self.wake_endpoint.as_str();
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let body = Self::read_body(url, response).await?;
        if !body.status.is_success() {
            let message = error_message(body.status, &body.bytes);
            warn!(url = url, status = body.status.as_u16(), "Wake request rejected: {}", message);
            return Err(CoordinatorError::Unreachable { message });
        }

        let raw: RawWakeResponse = serde_json::from_slice(&body.bytes)
            .map_err(|e| CoordinatorError::invalid_response(e.to_string()))?;

        raw.into_result(self.default_estimated_ready_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wake_response(json: &str) -> RawWakeResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_wake_response_already_running() {
        let result = wake_response(r#"{"success": true, "state": "running"}"#)
            .into_result(60)
            .unwrap();

        assert!(result.already_running);
    }

    #[test]
    fn test_wake_response_pending_uses_estimate() {
        let result = wake_response(r#"{"success": true, "state": "pending", "estimatedReadySeconds": 74.2}"#)
            .into_result(60)
            .unwrap();

        assert!(!result.already_running);
        assert_eq!(result.estimated_ready_seconds, 75);
    }

    #[test]
    fn test_wake_response_defaults_estimate() {
        let result = wake_response(r#"{"success": true}"#).into_result(60).unwrap();

        assert!(!result.already_running);
        assert_eq!(result.estimated_ready_seconds, 60);
    }

    #[test]
    fn test_wake_response_failure_prefers_error_field() {
        let err = wake_response(r#"{"success": false, "error": "quota exceeded", "message": "nope"}"#)
            .into_result(60)
            .unwrap_err();

        assert_eq!(
            err,
            CoordinatorError::WakeRejected {
                message: "quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn test_error_message_prefers_server_message() {
        let message = error_message(
            StatusCode::SERVICE_UNAVAILABLE,
            br#"{"message": "Control plane is deploying"}"#,
        );
        assert_eq!(message, "Control plane is deploying");
    }

    #[test]
    fn test_error_message_falls_back_to_status_text() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, b"<html>oops</html>"),
            "Bad Gateway"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, br#"{"message": "  "}"#),
            "Internal Server Error"
        );
    }

    #[test]
    fn test_error_message_skips_blank_message_for_error_field() {
        assert_eq!(
            error_message(
                StatusCode::SERVICE_UNAVAILABLE,
                br#"{"message": " ", "error": "Instance pool exhausted"}"#,
            ),
            "Instance pool exhausted"
        );

        let rejected = wake_response(r#"{"success": false, "error": "", "message": "Try later"}"#)
            .into_result(60)
            .unwrap_err();
        assert_eq!(rejected.to_string(), "Try later");
    }
}
