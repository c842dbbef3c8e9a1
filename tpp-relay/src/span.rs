//! Trace span adapter.
//!
//! A forward operation runs inside a child span of the inbound request's span.
//! [`Span`] is the contract the relay needs from a tracing backend;
//! [`TracingSpan`] implements it on top of the `tracing` crate.
//!
//! A span is either open or finished. The relay only ever finishes a span
//! through [`finish_span`] and [`fail_span`], which check `is_finished()`
//! first, so a span is finished at most once whatever path the operation takes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::headers::MessageHeaders;

/// Outcome recorded when a span is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Success,
    Failed,
}

/// State attached to a span when it is marked failed or finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStateMetadata {
    pub status: EventStatus,
    pub code: String,
    pub description: String,
}

impl EventStateMetadata {
    /// Failure state derived from a relay error.
    pub fn failed(error: &Error) -> Self {
        let code = error.api_error_code();
        Self {
            status: EventStatus::Failed,
            code: code.code.to_string(),
            description: code.message.to_string(),
        }
    }
}

/// Audit actions recorded against a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventAction {
    Start,
}

/// Domain type recorded in span tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Thirdparty,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Thirdparty => "thirdparty",
        }
    }
}

/// Action recorded in span tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Post,
    Lookup,
    Put,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Post => "post",
            EventAction::Lookup => "lookup",
            EventAction::Put => "put",
        }
    }
}

/// Span tags.
pub type SpanTags = BTreeMap<String, String>;

/// Builds the domain/action tags for an inbound third-party request.
pub fn span_tags(
    headers: &MessageHeaders,
    request_id: Option<&str>,
    event_type: EventType,
    action: EventAction,
) -> SpanTags {
    let mut tags = SpanTags::new();
    tags.insert("transactionType".to_string(), event_type.as_str().to_string());
    tags.insert("transactionAction".to_string(), action.as_str().to_string());
    if let Some(id) = request_id {
        tags.insert("transactionId".to_string(), id.to_string());
    }
    if let Some(source) = headers.source() {
        tags.insert("source".to_string(), source.to_string());
    }
    if let Some(destination) = headers.destination() {
        tags.insert("destination".to_string(), destination.to_string());
    }
    tags
}

/// Distributed trace span used by the relay.
#[async_trait]
pub trait Span: Send + Sync + Debug {
    /// Create a child span.
    fn child(&self, name: &str) -> Arc<dyn Span>;

    /// Attach tags to the span.
    fn set_tags(&self, tags: SpanTags);

    /// Record an audit event.
    async fn audit(&self, content: &Value, action: AuditEventAction);

    /// Record an error on the span.
    async fn error(&self, error: &Error, state: &EventStateMetadata);

    /// Finish the span, optionally with a failure state.
    async fn finish(&self, state: Option<&EventStateMetadata>);

    /// Whether the span has been finished.
    fn is_finished(&self) -> bool;
}

/// Finishes an open span without failure metadata.
pub async fn finish_span(span: Option<&Arc<dyn Span>>) {
    if let Some(span) = span {
        if !span.is_finished() {
            span.finish(None).await;
        }
    }
}

/// Marks an open span failed with the error and finishes it.
pub async fn fail_span(span: Option<&Arc<dyn Span>>, error: &Error) {
    if let Some(span) = span {
        if !span.is_finished() {
            let state = EventStateMetadata::failed(error);
            span.error(error, &state).await;
            span.finish(Some(&state)).await;
        }
    }
}

/// [`Span`] implementation on top of `tracing`.
#[derive(Debug)]
pub struct TracingSpan {
    name: String,
    trace_id: String,
    span_id: String,
    inner: tracing::Span,
    tags: Mutex<SpanTags>,
    finished: AtomicBool,
}

impl TracingSpan {
    /// Start a new root span with a fresh trace id.
    pub fn root(name: &str) -> Arc<Self> {
        Arc::new(Self::start(name, Uuid::new_v4().simple().to_string(), None))
    }

    fn start(name: &str, trace_id: String, parent: Option<&tracing::Span>) -> Self {
        let span_id = Uuid::new_v4().simple().to_string()[..16].to_string();
        let inner = match parent {
            Some(parent) => info_span!(parent: parent, "relay_span", span_name = %name, trace_id = %trace_id, span_id = %span_id),
            None => info_span!("relay_span", span_name = %name, trace_id = %trace_id, span_id = %span_id),
        };
        Self {
            name: name.to_string(),
            trace_id,
            span_id,
            inner,
            tags: Mutex::new(SpanTags::new()),
            finished: AtomicBool::new(false),
        }
    }

    /// Start a child span sharing this span's trace id.
    pub fn child_span(&self, name: &str) -> Arc<Self> {
        let child = Self::start(name, self.trace_id.clone(), Some(&self.inner));
        child.set_tags(self.tags());
        Arc::new(child)
    }

    /// Name of the span.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trace id shared by this span and all of its children.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Identifier of this span within the trace.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Tags set so far.
    pub fn tags(&self) -> SpanTags {
        self.tags.lock().map(|tags| tags.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Span for TracingSpan {
    fn child(&self, name: &str) -> Arc<dyn Span> {
        self.child_span(name)
    }

    fn set_tags(&self, tags: SpanTags) {
        debug!(parent: &self.inner, tags = ?tags, "span tags set");
        if let Ok(mut current) = self.tags.lock() {
            current.extend(tags);
        }
    }

    async fn audit(&self, content: &Value, action: AuditEventAction) {
        info!(parent: &self.inner, action = ?action, content = %content, "audit");
    }

    async fn error(&self, error: &Error, state: &EventStateMetadata) {
        warn!(
            parent: &self.inner,
            code = %state.code,
            description = %state.description,
            "span error: {}",
            error
        );
    }

    async fn finish(&self, state: Option<&EventStateMetadata>) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        match state {
            Some(state) => info!(
                parent: &self.inner,
                status = ?state.status,
                code = %state.code,
                "span finished"
            ),
            None => info!(parent: &self.inner, status = ?EventStatus::Success, "span finished"),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}
