//! Forwarding with a compensating error callback.
//!
//! A [`Relay`] forwards one inbound message to the destination participant.
//! When resolution or dispatch fails it builds the FSPIOP error envelope and
//! hands it to its [`ErrorCompensator`], which delivers it to the participant
//! that sent the original message. The compensator never compensates its own
//! failures.
//!
//! The two resource families differ only in their [`ResourceFamily`]
//! descriptor; see [`account_request`] and [`accounts`].

pub mod account_request;
pub mod accounts;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ErrorHandlingConfig, RelayConfig};
use crate::dispatcher::{DispatchRequest, DispatchResponse, Dispatcher, ResponseType, RestMethod};
use crate::endpoint::EndpointResolver;
use crate::error::{Error, Result};
use crate::headers::MessageHeaders;
use crate::span::{fail_span, finish_span, Span};
use crate::template::{render_url, PathParams};

pub use account_request::TppAccountRequestRelay;
pub use accounts::TppAccountsRelay;

/// Static description of one resource family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceFamily {
    /// Resource name used in log and error messages.
    pub resource: &'static str,
    /// Payload field carrying the request identifier.
    pub id_field: &'static str,
    /// Callback type resolved for the destination.
    pub callback_type: &'static str,
    /// Callback type resolved for the error destination.
    pub error_callback_type: &'static str,
    /// Path template of the error callback.
    pub error_path: &'static str,
    /// Name of the child span opened by a forward.
    pub forward_span: &'static str,
    /// Name of the child span opened by an error callback.
    pub error_span: &'static str,
}

/// One inbound message to be relayed.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub path: String,
    pub headers: MessageHeaders,
    pub method: RestMethod,
    pub params: PathParams,
    pub payload: Option<Value>,
    pub span: Option<Arc<dyn Span>>,
}

impl ForwardRequest {
    pub fn new(path: impl Into<String>, headers: MessageHeaders, method: RestMethod) -> Self {
        Self {
            path: path.into(),
            headers,
            method,
            params: PathParams::default(),
            payload: None,
            span: None,
        }
    }

    pub fn with_params(mut self, params: PathParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_span(mut self, span: Arc<dyn Span>) -> Self {
        self.span = Some(span);
        self
    }

    /// Identifier taken from the payload's id field, falling back to the `ID` path parameter.
    fn request_id(&self, id_field: &str) -> Option<String> {
        self.payload
            .as_ref()
            .and_then(|payload| payload.get(id_field))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| self.params.id.clone())
    }
}

/// An error message to deliver to a participant.
#[derive(Debug, Clone)]
pub struct ErrorCallback {
    /// Headers of the message the error relates to.
    pub headers: MessageHeaders,
    /// Participant receiving the error.
    pub to: String,
    pub path: String,
    pub method: RestMethod,
    pub request_id: Option<String>,
    pub payload: Option<Value>,
    pub span: Option<Arc<dyn Span>>,
}

/// Delivers error callbacks.
#[async_trait]
pub trait ErrorCompensator: Send + Sync + Debug {
    /// Deliver the error callback. Failures are returned, never compensated.
    async fn compensate_error(&self, callback: ErrorCallback) -> Result<bool>;
}

/// Resolves the error endpoint of `to` and dispatches the error there.
#[derive(Debug, Clone)]
pub struct CallbackCompensator {
    family: ResourceFamily,
    switch_url: String,
    resolver: Arc<dyn EndpointResolver>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl CallbackCompensator {
    pub fn new(
        family: ResourceFamily,
        switch_url: impl Into<String>,
        resolver: Arc<dyn EndpointResolver>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            family,
            switch_url: switch_url.into(),
            resolver,
            dispatcher,
        }
    }

    async fn deliver(
        &self,
        callback: &ErrorCallback,
        span: Option<Arc<dyn Span>>,
    ) -> Result<DispatchResponse> {
        let family = &self.family;
        let request_id = callback.request_id.as_deref();

        let endpoint = self
            .resolver
            .resolve(&self.switch_url, &callback.to, family.error_callback_type)
            .await?;
        info!(
            "Resolved {} endpoint of {} for {} {}: {:?}",
            family.error_callback_type,
            callback.to,
            family.resource,
            request_id.unwrap_or_default(),
            endpoint
        );
        let endpoint = endpoint.ok_or_else(|| {
            Error::routing_unavailable(
                family.error_callback_type,
                family.resource,
                request_id,
                &callback.to,
            )
        })?;

        let params = PathParams {
            id: callback.request_id.clone(),
            signed_challenge: None,
        };
        let url = render_url(&endpoint, &callback.path, &params)?;
        info!("Forwarding {} error to endpoint: {}", family.resource, url);

        self.dispatcher
            .send(DispatchRequest {
                url,
                headers: callback.headers.clone(),
                source: callback.headers.source().unwrap_or_default().to_string(),
                destination: callback.headers.destination().unwrap_or_default().to_string(),
                method: callback.method,
                payload: callback
                    .payload
                    .clone()
                    .filter(|_| !callback.method.is_retrieval()),
                response_type: ResponseType::Json,
                span,
            })
            .await
    }
}

#[async_trait]
impl ErrorCompensator for CallbackCompensator {
    async fn compensate_error(&self, callback: ErrorCallback) -> Result<bool> {
        let child = callback
            .span
            .as_ref()
            .map(|span| span.child(self.family.error_span));

        match self.deliver(&callback, child.clone()).await {
            Ok(response) => {
                info!(
                    "Forwarded {} error for {} to {} got response {} {}",
                    self.family.resource,
                    callback.request_id.as_deref().unwrap_or_default(),
                    callback.to,
                    response.status,
                    response.status_text
                );
                finish_span(child.as_ref()).await;
                Ok(true)
            }
            Err(error) => {
                warn!(
                    "Error forwarding {} error to {}: {}",
                    self.family.resource, callback.to, error
                );
                fail_span(child.as_ref(), &error).await;
                Err(error)
            }
        }
    }
}

/// Forwards messages of one resource family.
#[derive(Debug, Clone)]
pub struct Relay {
    family: ResourceFamily,
    switch_url: String,
    error_handling: ErrorHandlingConfig,
    resolver: Arc<dyn EndpointResolver>,
    dispatcher: Arc<dyn Dispatcher>,
    compensator: Arc<dyn ErrorCompensator>,
}

impl Relay {
    /// Creates a relay that compensates through a [`CallbackCompensator`].
    pub fn new(
        family: ResourceFamily,
        config: &RelayConfig,
        resolver: Arc<dyn EndpointResolver>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let compensator = Arc::new(CallbackCompensator::new(
            family,
            config.switch_endpoint.clone(),
            resolver.clone(),
            dispatcher.clone(),
        ));
        Self {
            family,
            switch_url: config.switch_endpoint.clone(),
            error_handling: config.error_handling.clone(),
            resolver,
            dispatcher,
            compensator,
        }
    }

    /// Replaces the error compensator.
    pub fn with_compensator(mut self, compensator: Arc<dyn ErrorCompensator>) -> Self {
        self.compensator = compensator;
        self
    }

    /// Forwards `request` to its destination, compensating on failure.
    ///
    /// Returns `Ok(true)` once the destination accepted the message. On
    /// failure the error callback is attempted exactly once before the error
    /// is returned. If that callback fails too, the result is
    /// [`Error::Compensation`] carrying both failures.
    pub async fn forward(&self, request: ForwardRequest) -> Result<bool> {
        let family = &self.family;
        let child = request
            .span
            .as_ref()
            .map(|span| span.child(family.forward_span));
        let source = request.headers.source().unwrap_or_default().to_string();
        let destination = request.headers.destination().unwrap_or_default().to_string();

        let request_id = request.request_id(family.id_field);
        if request_id.is_none() {
            warn!(
                "Forwarding {} from {} without a request id",
                family.resource, source
            );
        }
        let payload = request.payload.clone().unwrap_or_else(|| {
            let mut minimal = Map::new();
            if let Some(id) = &request_id {
                minimal.insert(family.id_field.to_string(), json!(id));
            }
            Value::Object(minimal)
        });

        let attempt = self
            .attempt(
                &request,
                &source,
                &destination,
                request_id.as_deref(),
                payload,
                child.clone(),
            )
            .await;

        let error = match attempt {
            Ok(response) => {
                info!(
                    "Forwarded {} {} from {} to {} got response {} {}",
                    family.resource,
                    request_id.as_deref().unwrap_or_default(),
                    source,
                    destination,
                    response.status,
                    response.status_text
                );
                finish_span(child.as_ref()).await;
                return Ok(true);
            }
            Err(error) => error,
        };

        warn!("Error forwarding {} to {}: {}", family.resource, destination, error);
        let envelope = error.to_api_error_object(&self.error_handling).to_value();
        let callback = ErrorCallback {
            headers: request.headers.clone(),
            to: source,
            path: family.error_path.to_string(),
            method: RestMethod::Put,
            request_id,
            payload: Some(envelope),
            span: child.clone(),
        };
        let error = match self.compensator.compensate_error(callback).await {
            Ok(_) => error,
            Err(failure) => Error::Compensation {
                failure: Box::new(failure),
                original: Box::new(error),
            },
        };

        fail_span(child.as_ref(), error.original()).await;
        Err(error)
    }

    /// Relays an inbound error callback.
    pub async fn forward_error(&self, callback: ErrorCallback) -> Result<bool> {
        self.compensator.compensate_error(callback).await
    }

    async fn attempt(
        &self,
        request: &ForwardRequest,
        source: &str,
        destination: &str,
        request_id: Option<&str>,
        payload: Value,
        span: Option<Arc<dyn Span>>,
    ) -> Result<DispatchResponse> {
        let family = &self.family;

        let endpoint = self
            .resolver
            .resolve(&self.switch_url, destination, family.callback_type)
            .await?;
        info!(
            "Resolved {} endpoint of {} for {} {}: {:?}",
            family.callback_type,
            destination,
            family.resource,
            request_id.unwrap_or_default(),
            endpoint
        );
        let endpoint = endpoint.ok_or_else(|| {
            Error::routing_unavailable(family.callback_type, family.resource, request_id, destination)
        })?;

        let params = PathParams {
            id: request_id.map(str::to_string),
            signed_challenge: request.params.signed_challenge.clone(),
        };
        let url = render_url(&endpoint, &request.path, &params)?;
        info!("Forwarding {} to endpoint: {}", family.resource, url);

        self.dispatcher
            .send(DispatchRequest {
                url,
                headers: request.headers.clone(),
                source: source.to_string(),
                destination: destination.to_string(),
                method: request.method,
                payload: Some(payload).filter(|_| !request.method.is_retrieval()),
                response_type: ResponseType::Json,
                span,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE;
    use crate::headers::MessageHeaders;

    #[test]
    fn test_request_id_prefers_payload_field() {
        let request = ForwardRequest::new("/tppAccounts/{{ID}}", MessageHeaders::new(), RestMethod::Put)
            .with_params(PathParams::with_id("from-path"))
            .with_payload(Some(json!({ "accountRequestId": "from-body" })));
        assert_eq!(request.request_id("accountRequestId").as_deref(), Some("from-body"));

        let request = request.with_payload(Some(json!({ "accounts": [] })));
        assert_eq!(request.request_id("accountRequestId").as_deref(), Some("from-path"));

        let request = ForwardRequest::new("/tppAccountRequest", MessageHeaders::new(), RestMethod::Post);
        assert_eq!(request.request_id("accountRequestId"), None);
    }

    #[test]
    fn test_family_descriptors() {
        assert_eq!(accounts::TPP_ACCOUNTS.resource, "tppAccounts");
        assert_eq!(accounts::TPP_ACCOUNTS.error_path, "/tppAccounts/{{ID}}/error");
        assert_eq!(account_request::TPP_ACCOUNT_REQUEST.resource, "tppAccountRequest");
        assert_eq!(
            account_request::TPP_ACCOUNT_REQUEST.callback_type,
            FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE
        );
    }
}
