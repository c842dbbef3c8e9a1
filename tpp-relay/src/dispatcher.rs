//! Outbound dispatch of relayed messages.
//!
//! The [`Dispatcher`] trait is the seam between the relay and the transport.
//! [`HttpDispatcher`] delivers over HTTP with reqwest.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::headers::{MessageHeaders, FSPIOP_DESTINATION, FSPIOP_SOURCE};
use crate::span::Span;

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Message used for every delivery failure.
pub const SEND_FAILED_MESSAGE: &str = "Failed to send HTTP request to host";

/// HTTP methods the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestMethod {
    Get,
    Post,
    Put,
}

impl RestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestMethod::Get => "GET",
            RestMethod::Post => "POST",
            RestMethod::Put => "PUT",
        }
    }

    /// Retrieval methods never carry a body.
    pub fn is_retrieval(&self) -> bool {
        matches!(self, RestMethod::Get)
    }
}

impl fmt::Display for RestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RestMethod> for reqwest::Method {
    fn from(method: RestMethod) -> Self {
        match method {
            RestMethod::Get => reqwest::Method::GET,
            RestMethod::Post => reqwest::Method::POST,
            RestMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// Expected response body type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Json,
}

/// A fully resolved outbound request.
#[derive(Clone)]
pub struct DispatchRequest {
    pub url: String,
    pub headers: MessageHeaders,
    pub source: String,
    pub destination: String,
    pub method: RestMethod,
    pub payload: Option<Value>,
    pub response_type: ResponseType,
    pub span: Option<Arc<dyn Span>>,
}

impl Debug for DispatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRequest")
            .field("url", &self.url)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("method", &self.method)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Status line of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResponse {
    pub status: u16,
    pub status_text: String,
}

/// Sends relayed messages to their destination.
#[async_trait]
pub trait Dispatcher: Send + Sync + Debug {
    /// Deliver the request; any failure is reported as an error.
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResponse>;
}

/// HTTP dispatcher backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    /// HTTP client.
    client: Client,

    /// Request timeout in seconds.
    timeout_secs: u64,
}

impl HttpDispatcher {
    /// Creates a new HTTP dispatcher.
    pub fn new(timeout_secs: Option<u64>) -> Self {
        Self {
            client: Client::new(),
            timeout_secs: timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the request timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResponse> {
        info!("Sending {} request to {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.into(), &request.url);
        for (name, value) in request.headers.outbound() {
            if name == FSPIOP_SOURCE || name == FSPIOP_DESTINATION {
                continue;
            }
            builder = builder.header(name, value);
        }
        builder = builder
            .header(FSPIOP_SOURCE, &request.source)
            .header(FSPIOP_DESTINATION, &request.destination);
        if request.headers.get("accept").is_none() {
            builder = builder.header("Accept", "application/json");
        }

        let payload = request
            .payload
            .as_ref()
            .filter(|_| !request.method.is_retrieval());
        if let Some(payload) = payload {
            let body = serde_json::to_vec(payload)?;
            debug!("Payload size: {} bytes", body.len());
            if request.headers.get("content-type").is_none() {
                builder = builder.header("Content-Type", "application/json");
            }
            builder = builder.body(body);
        }

        let started = Instant::now();
        let request_timeout = Duration::from_secs(self.timeout_secs);
        let result = timeout(request_timeout, builder.send()).await;
        if let Some(span) = &request.span {
            debug!(
                trace = ?span,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "transport finished"
            );
        }

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(Error::transport(SEND_FAILED_MESSAGE, Some(e.to_string())))
            }
            Err(_) => {
                return Err(Error::transport(
                    SEND_FAILED_MESSAGE,
                    Some(format!(
                        "Request timed out after {} seconds",
                        self.timeout_secs
                    )),
                ))
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(DispatchResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read error response>".to_string());
        warn!(
            "Delivery to {} failed: Status {}, Body: {}",
            request.url, status, error_body
        );
        Err(Error::transport(
            SEND_FAILED_MESSAGE,
            Some(format!("status {}: {}", status, error_body)),
        ))
    }
}
