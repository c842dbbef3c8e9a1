//! Test doubles shared by the relay integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tpp_relay::error::{Error, Result};
use tpp_relay::span::{AuditEventAction, EventStateMetadata, SpanTags};
use tpp_relay::{
    DispatchRequest, DispatchResponse, Dispatcher, EndpointResolver, ErrorCallback,
    ErrorCompensator, MessageHeaders, Span,
};

pub fn headers() -> MessageHeaders {
    MessageHeaders::new()
        .with("FSPIOP-Source", "dfsp1")
        .with("FSPIOP-Destination", "dfsp2")
        .with("Date", "Thu, 24 Jan 2019 10:22:12 GMT")
}

/// Span that counts every call made on it.
#[derive(Debug, Default)]
pub struct MockSpan {
    name: String,
    finished: AtomicBool,
    finish_calls: AtomicUsize,
    failed_finish_calls: AtomicUsize,
    error_calls: AtomicUsize,
    audits: AtomicUsize,
    tags: Mutex<SpanTags>,
    children: Mutex<Vec<Arc<MockSpan>>>,
}

impl MockSpan {
    pub fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Self::default()
        })
    }

    pub fn finish_calls(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }

    pub fn failed_finish_calls(&self) -> usize {
        self.failed_finish_calls.load(Ordering::SeqCst)
    }

    pub fn error_calls(&self) -> usize {
        self.error_calls.load(Ordering::SeqCst)
    }

    pub fn audits(&self) -> usize {
        self.audits.load(Ordering::SeqCst)
    }

    pub fn tags(&self) -> SpanTags {
        self.tags.lock().unwrap().clone()
    }

    pub fn child_named(&self, name: &str) -> Option<Arc<MockSpan>> {
        self.children
            .lock()
            .unwrap()
            .iter()
            .find(|child| child.name == name)
            .cloned()
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().unwrap().len()
    }
}

#[async_trait]
impl Span for MockSpan {
    fn child(&self, name: &str) -> Arc<dyn Span> {
        let child = MockSpan::named(name);
        self.children.lock().unwrap().push(child.clone());
        child
    }

    fn set_tags(&self, tags: SpanTags) {
        self.tags.lock().unwrap().extend(tags);
    }

    async fn audit(&self, _content: &Value, _action: AuditEventAction) {
        self.audits.fetch_add(1, Ordering::SeqCst);
    }

    async fn error(&self, _error: &Error, _state: &EventStateMetadata) {
        self.error_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn finish(&self, state: Option<&EventStateMetadata>) {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        if state.is_some() {
            self.failed_finish_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.finished.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Resolver answering from a fixed participant table and recording lookups.
#[derive(Debug, Default)]
pub struct MockResolver {
    endpoints: HashMap<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, participant: &str, url: &str) -> Self {
        self.endpoints.insert(participant.to_string(), url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EndpointResolver for MockResolver {
    async fn resolve(
        &self,
        _switch_url: &str,
        participant_id: &str,
        callback_type: &str,
    ) -> Result<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((participant_id.to_string(), callback_type.to_string()));
        Ok(self.endpoints.get(participant_id).cloned())
    }
}

/// Dispatcher recording every request, failing those whose URL contains a pattern.
#[derive(Debug, Default)]
pub struct MockDispatcher {
    fail_patterns: Vec<String>,
    sent: Mutex<Vec<DispatchRequest>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, pattern: &str) -> Self {
        self.fail_patterns.push(pattern.to_string());
        self
    }

    pub fn sent(&self) -> Vec<DispatchRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResponse> {
        let fail = self
            .fail_patterns
            .iter()
            .any(|pattern| request.url.contains(pattern.as_str()));
        self.sent.lock().unwrap().push(request);
        if fail {
            return Err(Error::transport(
                "Failed to send HTTP request to host",
                Some("connect ECONNREFUSED".to_string()),
            ));
        }
        Ok(DispatchResponse {
            status: 202,
            status_text: "Accepted".to_string(),
        })
    }
}

/// Compensator recording the callbacks it receives.
#[derive(Debug, Default)]
pub struct RecordingCompensator {
    fail: bool,
    callbacks: Mutex<Vec<ErrorCallback>>,
}

impl RecordingCompensator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn callbacks(&self) -> Vec<ErrorCallback> {
        self.callbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorCompensator for RecordingCompensator {
    async fn compensate_error(&self, callback: ErrorCallback) -> Result<bool> {
        let to = callback.to.clone();
        self.callbacks.lock().unwrap().push(callback);
        if self.fail {
            return Err(Error::routing_unavailable(
                "FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE",
                "tppAccounts",
                None,
                &to,
            ));
        }
        Ok(true)
    }
}
