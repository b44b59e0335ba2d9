//! Report submission gateway
//!
//! Hands a finished report draft to the backend's report-creation
//! endpoint. No internal retries: a failed submission surfaces once and
//! the engine resets the session instead of retrying automatically.

use crate::config::{Settings, GATEWAY_TIMEOUT_SECS};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Errors that can occur while submitting a report
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The backend answered with a non-success status
    #[error("Backend error {status}: {message}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Human-readable message from the error payload, or a generic
        /// fallback when the payload was unparseable
        message: String,
    },
    /// The call never completed (connection failure or timeout)
    #[error("Network error: {0}")]
    Network(String),
    /// The success payload did not carry a report identifier
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

/// Transient bundle assembled just before submission and discarded
/// afterwards regardless of outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDraft {
    /// Validated report description
    pub description: String,
    /// Report latitude
    pub latitude: f64,
    /// Report longitude
    pub longitude: f64,
    /// Photo as a `data:<mime>;base64,<payload>` URI
    pub photo: String,
}

/// Encode a photo payload into the transport-safe data URI the backend
/// expects. An empty MIME type falls back to `image/jpeg`.
#[must_use]
pub fn encode_photo(bytes: &[u8], mime_type: &str) -> String {
    let mime = if mime_type.is_empty() {
        "image/jpeg"
    } else {
        mime_type
    };
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Capability of persisting a finished report
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportGateway: Send + Sync {
    /// Submit a report draft, returning the persisted identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on network failure, non-success status,
    /// or a success payload without an identifier.
    async fn submit(&self, draft: &ReportDraft) -> Result<String, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct CreatedReport {
    id: serde_json::Value,
}

/// Lenient shape of the backend's error payload
#[derive(Debug, Deserialize, Default)]
struct BackendErrorBody {
    error: Option<String>,
}

/// HTTP implementation of the gateway against the report backend
pub struct HttpGateway {
    client: HttpClient,
    url: String,
}

impl HttpGateway {
    /// Build a gateway from settings, with a bounded request timeout
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| HttpClient::new());

        Self {
            client,
            url: format!(
                "{}{}",
                settings.backend_url.trim_end_matches('/'),
                settings.reports_endpoint
            ),
        }
    }
}

#[async_trait]
impl ReportGateway for HttpGateway {
    async fn submit(&self, draft: &ReportDraft) -> Result<String, GatewayError> {
        info!("📤 Submitting report to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(draft)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: BackendErrorBody = response.json().await.unwrap_or_default();
            let message = body.error.unwrap_or_else(|| "Unknown error".to_string());
            error!("❌ Backend rejected report ({status}): {message}");
            return Err(GatewayError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreatedReport = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let id = match &created.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        info!("✅ Report created with id {id}");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_photo_data_uri() {
        let uri = encode_photo(b"abc", "image/png");
        assert_eq!(uri, "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_encode_photo_defaults_mime() {
        let uri = encode_photo(b"abc", "");
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }
}
