//! Outbound delivery of event batches.
//!
//! The sender only depends on the [`Transport`] trait; [`HttpTransport`] is
//! the production implementation that POSTs batches to a webhook.

use crate::event::Event;
use serde::Serialize;
use std::time::Duration;

/// Transport error types.
#[derive(Debug)]
pub enum TransportError {
    /// The transport could not be constructed
    Config(String),
    /// Connection refused, DNS failure, timeout
    Network(String),
    /// Remote answered with a non-success status
    Rejected { status: u16, body: String },
    /// Request body could not be encoded
    Serialization(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Config(msg) => write!(f, "Transport config error: {msg}"),
            TransportError::Network(msg) => write!(f, "Transport network error: {msg}"),
            TransportError::Rejected { status, body } => {
                write!(f, "Remote rejected batch ({status}): {body}")
            }
            TransportError::Serialization(msg) => {
                write!(f, "Transport serialization error: {msg}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Capability to deliver one batch of events.
///
/// `send` blocks until the remote has accepted or refused the batch, or the
/// implementation's own timeout expires.
pub trait Transport: Send + Sync {
    fn send(&self, events: &[Event]) -> Result<(), TransportError>;
}

/// Request body posted to the webhook.
#[derive(Debug, Serialize)]
pub struct BatchPayload<'a> {
    pub events: &'a [Event],
}

/// Blocking HTTP transport posting `{"events": [...]}` to a webhook.
///
/// Wraps an async `reqwest` client with a private current-thread runtime so
/// it can be driven from the sender's worker thread.
pub struct HttpTransport {
    url: reqwest::Url,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpTransport {
    /// Create a transport for `url`, failing if the URL or client is unusable.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| TransportError::Config(format!("Invalid webhook URL '{url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::Config(format!(
                "Unsupported webhook scheme '{}'",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to create HTTP client: {e}")))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            url,
            client,
            runtime,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn post(&self, events: &[Event]) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&BatchPayload { events })
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

impl Transport for HttpTransport {
    fn send(&self, events: &[Event]) -> Result<(), TransportError> {
        self.runtime.block_on(self.post(events))
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_str())
            .finish()
    }
}
