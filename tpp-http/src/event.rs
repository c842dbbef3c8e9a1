//! Event system for the TPP HTTP gateway.
//!
//! The gateway publishes request/response activity, server lifecycle changes
//! and relay failures on an [`EventBus`]. Relay failures happen after the
//! inbound request has been answered, so the bus is the only place they
//! become visible besides the error callback itself.
//!
//! [`EventLogger`] is a subscriber that writes every event to the console
//! (through `tracing`), to a file, or to a custom sink, as plain text or
//! structured JSON.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, trace, warn, Level};
use warp::http::StatusCode;

use crate::error::{Error, Result};

/// HTTP gateway event types
#[derive(Debug, Clone)]
pub enum HttpEvent {
    /// Server started event
    ServerStarted {
        /// The address the server is bound to
        address: String,
    },

    /// Server stopped event
    ServerStopped,

    /// Request received event
    RequestReceived {
        /// The HTTP method
        method: String,
        /// The request path
        path: String,
        /// The client IP address
        client_ip: Option<String>,
        /// The timestamp when the request was received
        timestamp: DateTime<Utc>,
    },

    /// Response sent event
    ResponseSent {
        /// The HTTP status code
        status: StatusCode,
        /// The response size in bytes
        size: usize,
        /// The time it took to process the request in milliseconds
        duration_ms: u64,
    },

    /// A detached relay ended in an error
    RelayFailed {
        /// Inbound operation that started the relay
        operation: String,
        /// Request identifier, if known
        request_id: Option<String>,
        /// FSPIOP error code of the failure
        error_code: String,
        /// The error message
        message: String,
    },
}

/// Where event logs are written.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogDestination {
    /// Log through `tracing`
    #[default]
    Console,

    /// Append to a file
    File {
        /// Path to the log file
        path: String,
    },

    /// Custom logging function
    #[serde(skip)]
    Custom(Arc<dyn Fn(&str) + Send + Sync>),
}

impl fmt::Debug for LogDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogDestination::Console => write!(f, "LogDestination::Console"),
            LogDestination::File { path } => f
                .debug_struct("LogDestination::File")
                .field("path", path)
                .finish(),
            LogDestination::Custom(_) => write!(f, "LogDestination::Custom(<function>)"),
        }
    }
}

/// Configuration for the event logger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoggerConfig {
    /// Where to send the log output
    pub destination: LogDestination,

    /// Whether to use structured (JSON) logging
    pub structured: bool,

    /// Level used for console output
    #[serde(skip, default = "default_log_level")]
    pub log_level: Level,
}

fn default_log_level() -> Level {
    Level::INFO
}

impl Default for EventLoggerConfig {
    fn default() -> Self {
        Self {
            destination: LogDestination::Console,
            structured: false,
            log_level: default_log_level(),
        }
    }
}

/// Receives gateway events.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Handle a gateway event
    async fn handle_event(&self, event: HttpEvent);
}

/// Event bus for the gateway
pub struct EventBus {
    /// Sender for events
    sender: broadcast::Sender<HttpEvent>,
    /// Subscribers
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);

        Self {
            sender,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to gateway events
    pub async fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    /// Get a receiver for gateway events
    pub fn subscribe_channel(&self) -> broadcast::Receiver<HttpEvent> {
        self.sender.subscribe()
    }

    /// Remove a subscriber from the event bus
    pub async fn unsubscribe(&self, subscriber: &Arc<dyn EventSubscriber>) {
        self.subscribers
            .write()
            .await
            .retain(|s| !Arc::ptr_eq(s, subscriber));
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn publish_server_started(&self, address: String) {
        self.publish_event(HttpEvent::ServerStarted { address }).await;
    }

    pub async fn publish_server_stopped(&self) {
        self.publish_event(HttpEvent::ServerStopped).await;
    }

    pub async fn publish_request_received(
        &self,
        method: String,
        path: String,
        client_ip: Option<String>,
    ) {
        let event = HttpEvent::RequestReceived {
            method,
            path,
            client_ip,
            timestamp: Utc::now(),
        };
        self.publish_event(event).await;
    }

    pub async fn publish_response_sent(&self, status: StatusCode, size: usize, duration_ms: u64) {
        let event = HttpEvent::ResponseSent {
            status,
            size,
            duration_ms,
        };
        self.publish_event(event).await;
    }

    pub async fn publish_relay_failed(
        &self,
        operation: String,
        request_id: Option<String>,
        error_code: String,
        message: String,
    ) {
        let event = HttpEvent::RelayFailed {
            operation,
            request_id,
            error_code,
            message,
        };
        self.publish_event(event).await;
    }

    /// Publish an event to the channel and all subscribers
    async fn publish_event(&self, event: HttpEvent) {
        let _ = self.sender.send(event.clone());

        for subscriber in self.subscribers.read().await.iter() {
            subscriber.handle_event(event.clone()).await;
        }
    }
}

/// Subscriber writing events to the configured destination.
pub struct EventLogger {
    config: EventLoggerConfig,

    /// File handle if using file destination
    file: Option<Mutex<File>>,
}

impl EventLogger {
    /// Create a new event logger with the given configuration
    pub fn new(config: EventLoggerConfig) -> Self {
        let file = match &config.destination {
            LogDestination::File { path } => match Self::open_log_file(path) {
                Ok(file) => Some(Mutex::new(file)),
                Err(err) => {
                    error!("Failed to open log file {}: {}", path, err);
                    None
                }
            },
            _ => None,
        };

        Self { config, file }
    }

    fn open_log_file(path: &str) -> io::Result<File> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn log_event(&self, event: &HttpEvent) -> Result<()> {
        let log_message = if self.config.structured {
            Self::format_structured_log(event)?
        } else {
            Self::format_plain_log(event)
        };

        match &self.config.destination {
            LogDestination::Console => {
                match self.config.log_level {
                    Level::ERROR => error!("{}", log_message),
                    Level::WARN => warn!("{}", log_message),
                    Level::INFO => info!("{}", log_message),
                    Level::DEBUG => debug!("{}", log_message),
                    Level::TRACE => trace!("{}", log_message),
                }
                Ok(())
            }
            LogDestination::File { .. } => match &self.file {
                Some(file) => {
                    let mut file = file
                        .lock()
                        .map_err(|_| Error::Config("Failed to acquire log file lock".to_string()))?;
                    writeln!(file, "{}", log_message)?;
                    file.flush()?;
                    Ok(())
                }
                None => {
                    // file could not be opened; keep the event visible
                    error!("{}", log_message);
                    Ok(())
                }
            },
            LogDestination::Custom(func) => {
                func(&log_message);
                Ok(())
            }
        }
    }

    fn format_plain_log(event: &HttpEvent) -> String {
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");

        match event {
            HttpEvent::ServerStarted { address } => {
                format!("[{}] SERVER STARTED: address={}", now, address)
            }
            HttpEvent::ServerStopped => format!("[{}] SERVER STOPPED", now),
            HttpEvent::RequestReceived {
                method,
                path,
                client_ip,
                ..
            } => format!(
                "[{}] REQUEST RECEIVED: method={}, path={}, client_ip={}",
                now,
                method,
                path,
                client_ip.as_deref().unwrap_or("unknown")
            ),
            HttpEvent::ResponseSent {
                status,
                size,
                duration_ms,
            } => format!(
                "[{}] RESPONSE SENT: status={}, size={}, duration_ms={}",
                now,
                status.as_u16(),
                size,
                duration_ms
            ),
            HttpEvent::RelayFailed {
                operation,
                request_id,
                error_code,
                message,
            } => format!(
                "[{}] RELAY FAILED: operation={}, request_id={}, error_code={}, message={}",
                now,
                operation,
                request_id.as_deref().unwrap_or("unknown"),
                error_code,
                message
            ),
        }
    }

    fn format_structured_log(event: &HttpEvent) -> Result<String> {
        let (event_type, event_data) = match event {
            HttpEvent::ServerStarted { address } => {
                ("server_started", json!({ "address": address }))
            }
            HttpEvent::ServerStopped => ("server_stopped", json!({})),
            HttpEvent::RequestReceived {
                method,
                path,
                client_ip,
                timestamp,
            } => (
                "request_received",
                json!({
                    "method": method,
                    "path": path,
                    "client_ip": client_ip,
                    "request_timestamp": timestamp.to_rfc3339(),
                }),
            ),
            HttpEvent::ResponseSent {
                status,
                size,
                duration_ms,
            } => (
                "response_sent",
                json!({
                    "status": status.as_u16(),
                    "size": size,
                    "duration_ms": duration_ms,
                }),
            ),
            HttpEvent::RelayFailed {
                operation,
                request_id,
                error_code,
                message,
            } => (
                "relay_failed",
                json!({
                    "operation": operation,
                    "request_id": request_id,
                    "error_code": error_code,
                    "message": message,
                }),
            ),
        };

        let log_entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event_type": event_type,
            "data": event_data,
        });
        Ok(serde_json::to_string(&log_entry)?)
    }
}

#[async_trait]
impl EventSubscriber for EventLogger {
    async fn handle_event(&self, event: HttpEvent) {
        if let Err(err) = self.log_event(&event) {
            error!("Failed to log event: {}", err);
        }
    }
}

impl fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLogger")
            .field("config", &self.config)
            .field("file", &self.file.is_some())
            .finish()
    }
}
