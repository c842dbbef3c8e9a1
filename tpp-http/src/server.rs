//! HTTP server for the TPP gateway.
//!
//! The server exposes the inbound third-party account routes:
//!
//! - `POST /tppAccountRequest`
//! - `GET|PUT /tppAccountRequest/{ID}` and `PUT /tppAccountRequest/{ID}/error`
//! - `GET /tppAccounts/{ID}/{SignedChallenge}`
//! - `PUT /tppAccounts/{ID}` and `PUT /tppAccounts/{ID}/error`
//! - `GET /health`
//!
//! The server is built using the Warp web framework and provides graceful shutdown capabilities.

use crate::config::TppHttpConfig;
use crate::error::{error_envelope_response, Error, Result};
use crate::event::{EventBus, EventLogger};
use crate::handler::{
    handle_get_account_request, handle_get_accounts, handle_health_check,
    handle_post_account_request, handle_put_account_request, handle_put_account_request_error,
    handle_put_accounts, handle_put_accounts_error,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tpp_relay::{ApiErrorCode, TppRelay};
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// TPP HTTP server relaying account requests between participants.
pub struct TppHttpServer {
    /// Server configuration.
    config: TppHttpConfig,

    /// Relay shared by every route handler.
    relay: Arc<TppRelay>,

    /// Event bus for server events.
    event_bus: Arc<EventBus>,

    /// Shutdown channel for graceful server termination.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Address actually bound, once started.
    local_addr: Option<SocketAddr>,
}

impl TppHttpServer {
    /// Creates a new server, building the relay from the configuration.
    pub fn new(config: TppHttpConfig) -> Result<Self> {
        let relay = TppRelay::new(config.relay.clone())?;
        Ok(Self::with_relay(config, Arc::new(relay)))
    }

    /// Creates a new server around an existing relay.
    pub fn with_relay(config: TppHttpConfig, relay: Arc<TppRelay>) -> Self {
        Self {
            config,
            relay,
            event_bus: Arc::new(EventBus::new()),
            shutdown_tx: None,
            local_addr: None,
        }
    }

    /// Starts the HTTP server.
    ///
    /// Subscribes the event logger when one is configured, binds the
    /// configured address and serves on a separate Tokio task until
    /// `stop` is called.
    pub async fn start(&mut self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server_addr()
            .parse()
            .map_err(|e| Error::Http(format!("Invalid address: {}", e)))?;

        if let Some(logger_config) = &self.config.event_logger {
            let logger = EventLogger::new(logger_config.clone());
            self.event_bus.subscribe(Arc::new(logger)).await;
        }

        let routes = routes(self.relay.clone(), self.event_bus.clone());

        let (tx, rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(tx);

        info!("Starting TPP HTTP server on {}", addr);
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async {
                rx.await.ok();
                info!("Shutting down TPP HTTP server");
            })
            .map_err(|e| Error::Http(format!("Failed to bind {}: {}", addr, e)))?;

        tokio::spawn(server);
        self.local_addr = Some(bound);

        self.event_bus
            .publish_server_started(bound.to_string())
            .await;
        info!("TPP HTTP server started on {}", bound);
        Ok(())
    }

    /// Stops the HTTP server.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            self.local_addr = None;
            self.event_bus.publish_server_stopped().await;
            info!("Sent shutdown signal to TPP HTTP server");
        } else {
            warn!("TPP HTTP server is not running");
        }
        Ok(())
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn relay(&self) -> &Arc<TppRelay> {
        &self.relay
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn config(&self) -> &TppHttpConfig {
        &self.config
    }
}

/// Builds the full route table.
pub fn routes(
    relay: Arc<TppRelay>,
    event_bus: Arc<EventBus>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let post_account_request = warp::path!("tppAccountRequest")
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_relay(relay.clone()))
        .and(with_event_bus(event_bus.clone()))
        .and_then(handle_post_account_request);

    let get_account_request = warp::path!("tppAccountRequest" / String)
        .and(warp::get())
        .and(warp::header::headers_cloned())
        .and(with_relay(relay.clone()))
        .and(with_event_bus(event_bus.clone()))
        .and_then(handle_get_account_request);

    let put_account_request = warp::path!("tppAccountRequest" / String)
        .and(warp::put())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_relay(relay.clone()))
        .and(with_event_bus(event_bus.clone()))
        .and_then(handle_put_account_request);

    let put_account_request_error = warp::path!("tppAccountRequest" / String / "error")
        .and(warp::put())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_relay(relay.clone()))
        .and(with_event_bus(event_bus.clone()))
        .and_then(handle_put_account_request_error);

    // `/tppAccounts/{ID}/error` only exists for PUT
    let get_accounts = warp::path!("tppAccounts" / String / String)
        .and_then(|id: String, challenge: String| async move {
            if challenge == "error" {
                Err(warp::reject::not_found())
            } else {
                Ok::<_, Rejection>((id, challenge))
            }
        })
        .untuple_one()
        .and(warp::get())
        .and(warp::header::headers_cloned())
        .and(with_relay(relay.clone()))
        .and(with_event_bus(event_bus.clone()))
        .and_then(handle_get_accounts);

    let put_accounts = warp::path!("tppAccounts" / String)
        .and(warp::put())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_relay(relay.clone()))
        .and(with_event_bus(event_bus.clone()))
        .and_then(handle_put_accounts);

    let put_accounts_error = warp::path!("tppAccounts" / String / "error")
        .and(warp::put())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_relay(relay))
        .and(with_event_bus(event_bus.clone()))
        .and_then(handle_put_accounts_error);

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(with_event_bus(event_bus))
        .and_then(handle_health_check);

    post_account_request
        .or(get_account_request)
        .or(put_account_request)
        .or(put_account_request_error)
        .or(get_accounts)
        .or(put_accounts)
        .or(put_accounts_error)
        .or(health_route)
        .with(warp::trace::request())
        .recover(handle_rejection)
}

/// Helper function to provide the relay to route handlers.
fn with_relay(
    relay: Arc<TppRelay>,
) -> impl Filter<Extract = (Arc<TppRelay>,), Error = Infallible> + Clone {
    warp::any().map(move || relay.clone())
}

/// Helper function to provide the event bus to route handlers.
fn with_event_bus(
    event_bus: Arc<EventBus>,
) -> impl Filter<Extract = (Arc<EventBus>,), Error = Infallible> + Clone {
    warp::any().map(move || event_bus.clone())
}

/// Answers rejected requests with an FSPIOP error envelope.
async fn handle_rejection(err: Rejection) -> std::result::Result<warp::reply::Response, Infallible> {
    let response = if err.is_not_found() {
        error_envelope_response(
            StatusCode::NOT_FOUND,
            ApiErrorCode::UNKNOWN_URI,
            "Unknown URI",
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_envelope_response(
            StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::GENERIC_CLIENT_ERROR,
            "Method not allowed",
        )
    } else if let Some(e) = err.find::<Error>() {
        e.to_response()
    } else {
        error!("Unhandled rejection: {:?}", err);
        error_envelope_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
        )
    };
    Ok(response)
}
