//! Request handlers for the TPP HTTP gateway.
//!
//! Every inbound operation is acknowledged immediately with a fixed status.
//! The relay runs on a spawned task that the handler never awaits, so the
//! caller only learns about relay failures through the error callback the
//! relay sends back to it.

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tpp_relay::endpoint::templates;
use tpp_relay::span::{
    fail_span, finish_span, span_tags, AuditEventAction, EventAction, EventType,
};
use tpp_relay::{
    ErrorCallback, ForwardRequest, MessageHeaders, PathParams, RestMethod, Span, TppRelay,
    TracingSpan,
};
use tracing::{debug, error, info};
use warp::http::{HeaderMap, StatusCode};
use warp::{reply::json as json_reply, Reply};

use crate::error::{Error, Result};
use crate::event::EventBus;

/// Response structure for health checks.
#[derive(Serialize)]
struct HealthResponse {
    /// Status of the server, always "OK" when reachable
    status: String,
    /// Current version of the tpp-http package
    version: String,
}

/// Inbound operations served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AuthorisingAccountRequest,
    GetAccountRequest,
    UpdateAccountRequest,
    NotifyErrorAccountRequest,
    GetAccountsByUserId,
    UpdateAccountsByUserId,
    UpdateAccountsByUserIdError,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AuthorisingAccountRequest => "AuthorisingAccountRequest",
            Operation::GetAccountRequest => "GetAccountRequest",
            Operation::UpdateAccountRequest => "UpdateAccountRequest",
            Operation::NotifyErrorAccountRequest => "NotifyErrorAccountRequest",
            Operation::GetAccountsByUserId => "GetAccountsByUserId",
            Operation::UpdateAccountsByUserId => "UpdateAccountsByUserId",
            Operation::UpdateAccountsByUserIdError => "UpdateAccountsByUserIdError",
        }
    }

    /// Method of the inbound request, reused for the outbound one.
    pub fn method(&self) -> RestMethod {
        match self {
            Operation::AuthorisingAccountRequest => RestMethod::Post,
            Operation::GetAccountRequest | Operation::GetAccountsByUserId => RestMethod::Get,
            _ => RestMethod::Put,
        }
    }

    /// Outbound path template.
    pub fn template(&self) -> &'static str {
        match self {
            Operation::AuthorisingAccountRequest => templates::TP_ACCOUNT_REQUEST_POST,
            Operation::GetAccountRequest => templates::TP_ACCOUNT_REQUEST_GET,
            Operation::UpdateAccountRequest => templates::TP_ACCOUNT_REQUEST_PUT,
            Operation::NotifyErrorAccountRequest => templates::TP_ACCOUNT_REQUEST_PUT_ERROR,
            Operation::GetAccountsByUserId => templates::TPP_ACCOUNTS_GET,
            Operation::UpdateAccountsByUserId => templates::TPP_ACCOUNTS_PUT,
            Operation::UpdateAccountsByUserIdError => templates::TPP_ACCOUNTS_PUT_ERROR,
        }
    }

    /// Acknowledgement status returned to the caller.
    pub fn status(&self) -> StatusCode {
        match self.method() {
            RestMethod::Put => StatusCode::OK,
            RestMethod::Get | RestMethod::Post => StatusCode::ACCEPTED,
        }
    }

    pub fn action(&self) -> EventAction {
        match self.method() {
            RestMethod::Post => EventAction::Post,
            RestMethod::Get => EventAction::Lookup,
            RestMethod::Put => EventAction::Put,
        }
    }

    /// Error callbacks are relayed as-is instead of being forwarded.
    pub fn is_error_callback(&self) -> bool {
        matches!(
            self,
            Operation::NotifyErrorAccountRequest | Operation::UpdateAccountsByUserIdError
        )
    }
}

/// Handler for health check requests.
pub async fn handle_health_check(
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    debug!("Health check request received");
    let start_time = Instant::now();

    event_bus
        .publish_request_received("GET".to_string(), "/health".to_string(), None)
        .await;

    let response = HealthResponse {
        status: "OK".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let response_size = serde_json::to_string(&response)
        .map(|s| s.len())
        .unwrap_or(0);

    event_bus
        .publish_response_sent(
            StatusCode::OK,
            response_size,
            start_time.elapsed().as_millis() as u64,
        )
        .await;

    Ok(json_reply(&response))
}

/// `POST /tppAccountRequest`
pub async fn handle_post_account_request(
    headers: HeaderMap,
    body: Bytes,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(accept(
        Operation::AuthorisingAccountRequest,
        PathParams::default(),
        headers,
        body,
        relay,
        event_bus,
    )
    .await)
}

/// `GET /tppAccountRequest/{ID}`
pub async fn handle_get_account_request(
    id: String,
    headers: HeaderMap,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(accept(
        Operation::GetAccountRequest,
        PathParams::with_id(decode_segment(&id)),
        headers,
        Bytes::new(),
        relay,
        event_bus,
    )
    .await)
}

/// `PUT /tppAccountRequest/{ID}`
pub async fn handle_put_account_request(
    id: String,
    headers: HeaderMap,
    body: Bytes,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(accept(
        Operation::UpdateAccountRequest,
        PathParams::with_id(decode_segment(&id)),
        headers,
        body,
        relay,
        event_bus,
    )
    .await)
}

/// `PUT /tppAccountRequest/{ID}/error`
pub async fn handle_put_account_request_error(
    id: String,
    headers: HeaderMap,
    body: Bytes,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(accept(
        Operation::NotifyErrorAccountRequest,
        PathParams::with_id(decode_segment(&id)),
        headers,
        body,
        relay,
        event_bus,
    )
    .await)
}

/// `GET /tppAccounts/{ID}/{SignedChallenge}`
pub async fn handle_get_accounts(
    id: String,
    signed_challenge: String,
    headers: HeaderMap,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(accept(
        Operation::GetAccountsByUserId,
        PathParams::with_id(decode_segment(&id)).signed_challenge(decode_segment(&signed_challenge)),
        headers,
        Bytes::new(),
        relay,
        event_bus,
    )
    .await)
}

/// `PUT /tppAccounts/{ID}`
pub async fn handle_put_accounts(
    id: String,
    headers: HeaderMap,
    body: Bytes,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(accept(
        Operation::UpdateAccountsByUserId,
        PathParams::with_id(decode_segment(&id)),
        headers,
        body,
        relay,
        event_bus,
    )
    .await)
}

/// `PUT /tppAccounts/{ID}/error`
pub async fn handle_put_accounts_error(
    id: String,
    headers: HeaderMap,
    body: Bytes,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> std::result::Result<impl Reply, Infallible> {
    Ok(accept(
        Operation::UpdateAccountsByUserIdError,
        PathParams::with_id(decode_segment(&id)),
        headers,
        body,
        relay,
        event_bus,
    )
    .await)
}

/// Validates the request, spawns the relay and acknowledges.
async fn accept(
    operation: Operation,
    params: PathParams,
    headers: HeaderMap,
    body: Bytes,
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> warp::reply::Response {
    let start_time = Instant::now();
    let path = tpp_relay::template::render(operation.template(), &params);

    event_bus
        .publish_request_received(operation.method().to_string(), path.clone(), None)
        .await;

    let prepared = message_headers(&headers).and_then(|headers| {
        let payload = parse_payload(&body)?;
        Ok((headers, payload))
    });
    let (headers, payload) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Rejected {} {}: {}", operation.method(), path, e);
            let response = e.to_response();
            event_bus
                .publish_response_sent(
                    e.status_code(),
                    0,
                    start_time.elapsed().as_millis() as u64,
                )
                .await;
            return response;
        }
    };

    let span: Arc<dyn Span> = TracingSpan::root(operation.name());
    span.set_tags(span_tags(
        &headers,
        params.id.as_deref(),
        EventType::Thirdparty,
        operation.action(),
    ));
    span.audit(&audit_content(&headers, payload.as_ref()), AuditEventAction::Start)
        .await;

    info!(
        "{} from {} to {} accepted",
        operation.name(),
        headers.source().unwrap_or_default(),
        headers.destination().unwrap_or_default()
    );

    tokio::spawn(relay_in_background(
        relay,
        operation,
        headers,
        params,
        payload,
        span,
        event_bus.clone(),
    ));

    let status = operation.status();
    event_bus
        .publish_response_sent(status, 0, start_time.elapsed().as_millis() as u64)
        .await;
    warp::reply::with_status(warp::reply(), status).into_response()
}

/// Relays an accepted operation, then finishes its root span.
///
/// Failures are logged and published on the event bus since the caller has
/// already been answered.
async fn relay_in_background(
    relay: Arc<TppRelay>,
    operation: Operation,
    headers: MessageHeaders,
    params: PathParams,
    payload: Option<Value>,
    span: Arc<dyn Span>,
    event_bus: Arc<EventBus>,
) {
    let request_id = params.id.clone();
    match relay_operation(&relay, operation, headers, params, payload, span.clone()).await {
        Ok(_) => finish_span(Some(&span)).await,
        Err(e) => {
            error!("ERROR - {}: {}", operation.name(), e);
            fail_span(Some(&span), &e).await;
            event_bus
                .publish_relay_failed(
                    operation.name().to_string(),
                    request_id,
                    e.api_error_code().code.to_string(),
                    e.to_string(),
                )
                .await;
        }
    }
}

/// Runs the relay call behind an inbound operation.
async fn relay_operation(
    relay: &TppRelay,
    operation: Operation,
    headers: MessageHeaders,
    params: PathParams,
    payload: Option<Value>,
    span: Arc<dyn Span>,
) -> tpp_relay::Result<bool> {
    if operation.is_error_callback() {
        let callback = ErrorCallback {
            to: headers.destination().unwrap_or_default().to_string(),
            headers,
            path: operation.template().to_string(),
            method: operation.method(),
            request_id: params.id,
            payload,
            span: Some(span),
        };
        return match operation {
            Operation::NotifyErrorAccountRequest => {
                relay
                    .account_requests()
                    .forward_tpp_account_request_error(callback)
                    .await
            }
            _ => relay.accounts().forward_tpp_accounts_error(callback).await,
        };
    }

    let request = ForwardRequest::new(operation.template(), headers, operation.method())
        .with_params(params)
        .with_payload(payload)
        .with_span(span);
    match operation {
        Operation::GetAccountsByUserId | Operation::UpdateAccountsByUserId => {
            relay.accounts().forward_tpp_accounts(request).await
        }
        _ => {
            relay
                .account_requests()
                .forward_tpp_account_request(request)
                .await
        }
    }
}

/// Converts inbound headers, requiring the FSPIOP source and destination.
fn message_headers(headers: &HeaderMap) -> Result<MessageHeaders> {
    let converted: MessageHeaders = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect();

    for required in [tpp_relay::headers::FSPIOP_SOURCE, tpp_relay::headers::FSPIOP_DESTINATION] {
        if converted.get(required).map_or(true, str::is_empty) {
            return Err(Error::MissingHeader(required.to_string()));
        }
    }
    Ok(converted)
}

/// Parses the request body. An empty body means no payload.
fn parse_payload(body: &Bytes) -> Result<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| Error::Validation("Invalid UTF-8 in request body".to_string()))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|_| Error::Validation("Invalid JSON in request body".to_string()))
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn audit_content(headers: &MessageHeaders, payload: Option<&Value>) -> Value {
    let headers: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();
    json!({ "headers": headers, "payload": payload })
}
