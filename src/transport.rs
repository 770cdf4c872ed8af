//! HTTP transport to the ingestion server
//!
//! The controller talks to the server through [`FrameTransport`] so tests can
//! substitute a scripted implementation. [`HttpTransport`] is the real one.

use crate::config::ServerConfig;
use crate::errors::StreamError;
use crate::types::EncodedFrame;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::time::Duration;

/// Fully qualified URLs derived from the operator-supplied base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoints {
    pub base_url: String,
    pub status_url: String,
    pub upload_url: String,
}

impl StreamEndpoints {
    /// Validate `base_url` and join the configured paths onto it.
    pub fn parse(base_url: &str, server: &ServerConfig) -> Result<Self, StreamError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(StreamError::ConfigurationError(
                "enter server URL".to_string(),
            ));
        }

        let parsed = Url::parse(trimmed).map_err(|e| {
            StreamError::ConfigurationError(format!("invalid server URL ({})", e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(StreamError::ConfigurationError(format!(
                "invalid server URL ({})",
                trimmed
            )));
        }

        Ok(Self {
            base_url: trimmed.to_string(),
            status_url: format!("{}{}", trimmed, server.status_path),
            upload_url: format!("{}{}", trimmed, server.upload_path),
        })
    }
}

/// Request/response boundary used by the stream controller.
///
/// Both methods return the HTTP status code of whatever response arrived;
/// interpreting it is the caller's job. Network failures and timeouts are
/// reported as [`StreamError::TransportError`].
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Pre-flight probe (GET)
    async fn check_status(&self, url: &str) -> Result<u16, StreamError>;

    /// Deliver one encoded frame (POST)
    async fn upload_frame(&self, url: &str, frame: &EncodedFrame) -> Result<u16, StreamError>;
}

/// `reqwest`-backed transport with per-request timeouts
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    status_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpTransport {
    pub fn new(server: &ServerConfig) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("snapstream/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                StreamError::ConfigurationError(format!("failed to build HTTP client ({})", e))
            })?;

        Ok(Self {
            client,
            status_timeout: server.status_timeout(),
            upload_timeout: server.upload_timeout(),
        })
    }
}

#[async_trait]
impl FrameTransport for HttpTransport {
    async fn check_status(&self, url: &str) -> Result<u16, StreamError> {
        log::debug!("Probing {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        drain(response).await
    }

    async fn upload_frame(&self, url: &str, frame: &EncodedFrame) -> Result<u16, StreamError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, EncodedFrame::CONTENT_TYPE)
            .timeout(self.upload_timeout)
            .body(frame.data.clone())
            .send()
            .await
            .map_err(transport_error)?;
        drain(response).await
    }
}

/// Read the status and discard the body so the connection returns to the pool
async fn drain(response: reqwest::Response) -> Result<u16, StreamError> {
    let status = response.status().as_u16();
    if let Err(e) = response.bytes().await {
        log::debug!("Failed to read response body: {}", e);
    }
    Ok(status)
}

fn transport_error(error: reqwest::Error) -> StreamError {
    if error.is_timeout() {
        StreamError::TransportError("request timed out".to_string())
    } else if error.is_connect() {
        StreamError::TransportError("connection failed".to_string())
    } else {
        StreamError::TransportError(error.to_string())
    }
}
